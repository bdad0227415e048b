use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use eco_ledger::{
    AdminAward, AwardService, BalanceResolver, EntryStatus, LedgerConfig, LedgerContext, LedgerEntry,
    ProfileAggregate, RedemptionEngine, StaticVoucherCatalog, StoreVoucherCatalog, UserVoucherGrant,
    VoucherCatalog, VoucherDefinition,
};
use eco_types::{Caller, OwnerId, Points};
use serde::Serialize;

use crate::cli::*;
use crate::state;

/// Result of one command, rendered as text or JSON.
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Report {
    Donation { entry: LedgerEntry },
    Award { entry: LedgerEntry },
    Redemption { grant: UserVoucherGrant },
    Balance {
        owner: OwnerId,
        balance: Points,
        cached: Option<ProfileAggregate>,
    },
    History { owner: OwnerId, entries: Vec<LedgerEntry> },
    Vouchers { vouchers: Vec<VoucherDefinition> },
    Grants { owner: OwnerId, grants: Vec<UserVoucherGrant> },
}

impl Report {
    fn writes_state(&self) -> bool {
        matches!(self, Self::Donation { .. } | Self::Award { .. } | Self::Redemption { .. })
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    let _lock = state::lock_state(&cli.state)?;
    let store = Arc::new(state::load_store(&cli.state, config.page_size)?);
    let ctx = LedgerContext::new(store.clone(), config);
    state::resume_clock(&store, ctx.clock())?;

    let report = execute(&cli, &ctx).await?;
    if report.writes_state() {
        state::save_store(&cli.state, &store)?;
    }
    render(&report, cli.format)
}

fn acting_caller(cli: &Cli) -> anyhow::Result<Caller> {
    let Some(user) = &cli.user else {
        bail!("this command needs an acting user (--as <USER>)");
    };
    let id = OwnerId::new(user.as_str()).context("invalid --as user")?;
    Ok(Caller {
        id,
        is_admin: cli.admin,
    })
}

fn owner_or_caller(cli: &Cli, args: &OwnerArgs) -> anyhow::Result<OwnerId> {
    match &args.owner {
        Some(owner) => Ok(OwnerId::new(owner.as_str()).context("invalid owner")?),
        None => Ok(acting_caller(cli)?.id),
    }
}

/// Configured vouchers take precedence over the store's catalog partition.
fn catalog(ctx: &LedgerContext) -> Arc<dyn VoucherCatalog> {
    let seeded = &ctx.config().vouchers;
    if seeded.is_empty() {
        Arc::new(StoreVoucherCatalog::new(ctx.clone()))
    } else {
        Arc::new(StaticVoucherCatalog::new(seeded.iter().cloned()))
    }
}

pub async fn execute(cli: &Cli, ctx: &LedgerContext) -> anyhow::Result<Report> {
    let report = match &cli.command {
        Command::Donate(args) => {
            let caller = acting_caller(cli)?;
            let entry = AwardService::new(ctx.clone())
                .record_donation(&caller, args.kg, &args.note)
                .await?;
            Report::Donation { entry }
        }
        Command::Award(args) => {
            let caller = acting_caller(cli)?;
            let target = OwnerId::new(args.target.as_str()).map_err(eco_ledger::LedgerError::from)?;
            let mut award = AdminAward::new(target, args.kg).with_note(args.note.as_str());
            if let Some(points) = args.points {
                award = award.with_points(points);
            }
            let entry = AwardService::new(ctx.clone())
                .record_admin_award(&caller, award)
                .await?;
            Report::Award { entry }
        }
        Command::Redeem(args) => {
            let caller = acting_caller(cli)?;
            let grant = RedemptionEngine::new(ctx.clone(), catalog(ctx))
                .redeem(&caller, &args.voucher)
                .await?;
            Report::Redemption { grant }
        }
        Command::Balance(args) => {
            let owner = owner_or_caller(cli, args)?;
            let resolver = BalanceResolver::new(ctx.clone());
            let balance = resolver.resolve_balance(&owner).await?;
            let cached = resolver.cached_profile(&owner).await?;
            Report::Balance { owner, balance, cached }
        }
        Command::History(args) => {
            let owner = owner_or_caller(cli, args)?;
            let entries = BalanceResolver::new(ctx.clone()).history(&owner).await?;
            Report::History { owner, entries }
        }
        Command::Vouchers => Report::Vouchers {
            vouchers: catalog(ctx).list_definitions().await?,
        },
        Command::Grants(args) => {
            let owner = owner_or_caller(cli, args)?;
            let grants = RedemptionEngine::new(ctx.clone(), catalog(ctx))
                .grants(&owner)
                .await?;
            Report::Grants { owner, grants }
        }
    };
    Ok(report)
}

fn render(report: &Report, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    match report {
        Report::Donation { entry } => {
            println!("{} Donation recorded ({})", "✓".green().bold(), "pending approval".yellow());
            print_entry(entry);
        }
        Report::Award { entry } => {
            println!("{} Award recorded for {}", "✓".green().bold(), entry.owner.to_string().bold());
            print_entry(entry);
        }
        Report::Redemption { grant } => {
            println!("{} Redeemed {}", "✓".green().bold(), grant.title.bold());
            println!("  Code: {}", grant.code.cyan());
            println!("  Discount: {}", grant.discount);
            println!("  Expires: {}", grant.expires_at);
            println!("  Grant: {}", grant.grant_id.to_string().dimmed());
        }
        Report::Balance { owner, balance, cached } => {
            println!("{}: {} points", owner.to_string().bold(), balance.to_string().green().bold());
            match cached {
                Some(profile) => println!(
                    "  Cached total: {} points, {} kg",
                    profile.cached_total_points, profile.cached_total_mass_kg
                ),
                None => println!("  Cached total: {}", "none".dimmed()),
            }
        }
        Report::History { owner, entries } => {
            if entries.is_empty() {
                println!("No entries for {}.", owner.to_string().bold());
            }
            for entry in entries {
                let status = match entry.status {
                    EntryStatus::Approved => entry.status.as_str().green(),
                    EntryStatus::Pending => entry.status.as_str().yellow(),
                };
                println!(
                    "{}  {:<11} {:>8}  {}  {}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    entry.kind.as_str(),
                    signed_points(entry),
                    status,
                    entry.note
                );
            }
        }
        Report::Vouchers { vouchers } => {
            if vouchers.is_empty() {
                println!("No vouchers available.");
            }
            for voucher in vouchers {
                println!(
                    "{}  {}  {} points  ({})",
                    voucher.id.to_string().yellow(),
                    voucher.title.bold(),
                    voucher.points_required,
                    voucher.status.as_str()
                );
            }
        }
        Report::Grants { owner, grants } => {
            if grants.is_empty() {
                println!("No vouchers redeemed by {}.", owner.to_string().bold());
            }
            for grant in grants {
                println!("{}  {}  {}", grant.title.bold(), grant.code.cyan(), grant.status.as_str());
            }
        }
    }
    Ok(())
}

fn signed_points(entry: &LedgerEntry) -> String {
    match entry.net_points() {
        Some(points) => points.to_string(),
        None => format!("+{} -{}", entry.points_credit, entry.points_debit),
    }
}

fn print_entry(entry: &LedgerEntry) {
    println!("  Owner: {}", entry.owner);
    println!("  Points: {}", signed_points(entry));
    if !entry.mass_kg.value().is_zero() {
        println!("  Mass: {} kg", entry.mass_kg);
    }
    println!("  Note: {}", entry.note);
    println!("  Key: {}", entry.sequence_key.to_string().dimmed());
}
