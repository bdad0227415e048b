use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use eco_types::{MassKg, Points};

#[derive(Parser, Debug)]
#[command(
    name = "eco",
    about = "Eco points ledger: donations, awards, balances and voucher redemption",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Ledger state file (JSON snapshot of the store)
    #[arg(long, global = true, default_value = "eco-state.json")]
    pub state: PathBuf,

    /// Ledger configuration (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this user
    #[arg(long = "as", global = true, value_name = "USER")]
    pub user: Option<String>,

    /// Act with admin rights
    #[arg(long, global = true)]
    pub admin: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a donation (pending until approved)
    Donate(DonateArgs),
    /// Award points to a user (admin only)
    Award(AwardArgs),
    /// Redeem a voucher
    Redeem(RedeemArgs),
    /// Show the spendable balance and the cached totals
    Balance(OwnerArgs),
    /// List ledger entries in sequence order
    History(OwnerArgs),
    /// List redeemable vouchers
    Vouchers,
    /// List vouchers a user has redeemed
    Grants(OwnerArgs),
}

#[derive(Args, Debug)]
pub struct DonateArgs {
    /// Kilograms of plastic handed in
    #[arg(long)]
    pub kg: MassKg,
    #[arg(long, default_value = "")]
    pub note: String,
}

#[derive(Args, Debug)]
pub struct AwardArgs {
    /// User receiving the points
    pub target: String,
    #[arg(long, default_value = "0")]
    pub kg: MassKg,
    /// Points to award instead of the amount derived from --kg
    #[arg(long, allow_hyphen_values = true)]
    pub points: Option<Points>,
    #[arg(long, default_value = "")]
    pub note: String,
}

#[derive(Args, Debug)]
pub struct RedeemArgs {
    /// Voucher id, with or without the DEF# prefix
    pub voucher: String,
}

#[derive(Args, Debug)]
pub struct OwnerArgs {
    /// Defaults to the acting user
    pub owner: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_donation() {
        let cli = Cli::try_parse_from(["eco", "--as", "alice", "donate", "--kg", "2.5"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert_eq!(cli.state, PathBuf::from("eco-state.json"));
        match cli.command {
            Command::Donate(args) => {
                assert_eq!(args.kg, MassKg::new(dec!(2.5)));
                assert_eq!(args.note, "");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_negative_manual_points() {
        let cli = Cli::try_parse_from([
            "eco", "--as", "root", "--admin", "award", "alice", "--points", "-15", "--format", "json",
        ])
        .unwrap();
        assert!(cli.admin);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Award(args) => {
                assert_eq!(args.target, "alice");
                assert_eq!(args.points, Some(Points::from(-15)));
                assert_eq!(args.kg, MassKg::ZERO);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_non_numeric_mass() {
        assert!(Cli::try_parse_from(["eco", "donate", "--kg", "lots"]).is_err());
    }
}
