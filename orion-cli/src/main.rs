use std::path::PathBuf;
use std::process::ExitCode;

use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use orion_runtime::commands::{self, CommandContext, CommandOutcome, DeployVaultRequest};
use orion_runtime::config::Settings;
use orion_runtime::error::VaultError;
use orion_runtime::fees::FeeRequest;
use orion_runtime::intent::AllocationIntent;
use orion_runtime::types::{FeeType, VaultType};

/// Deploy and operate Orion Finance vaults.
///
/// Connection and keys come from the environment (or a `.env` file):
/// RPC_URL, CHAIN_ID, ORION_VAULT_ADDRESS, MANAGER_PRIVATE_KEY,
/// STRATEGIST_PRIVATE_KEY.
#[derive(Parser, Debug)]
#[command(name = "orion", author, version, about, after_help = EXIT_CODES)]
struct Cli {
    /// Vault to operate on; overrides ORION_VAULT_ADDRESS.
    #[arg(long, global = true)]
    vault: Option<Address>,

    #[command(subcommand)]
    command: Command,
}

const EXIT_CODES: &str = "\
Exit codes:
  0  confirmed, or nothing to change
  2  invalid input
  3  configuration error
  4  RPC read failed
  5  signing failed
  6  broadcast failed
  7  transaction reverted
  8  protocol not idle
  9  broadcast, unconfirmed (PENDING; check the printed hash)";

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a new vault through the transparent vault factory (manager key).
    DeployVault {
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        /// absolute, soft_hurdle, hard_hurdle, high_water_mark or hurdle_hwm
        #[arg(long)]
        fee_type: FeeType,
        /// Performance fee in basis points (max 3000).
        #[arg(long)]
        performance_fee: u16,
        /// Management fee in basis points (max 300).
        #[arg(long)]
        management_fee: u16,
        /// Defaults to the address of STRATEGIST_PRIVATE_KEY.
        #[arg(long)]
        strategist: Option<Address>,
        /// Deposit access control contract; omitted means open deposits.
        #[arg(long, default_value_t = Address::ZERO)]
        deposit_access_control: Address,
        #[arg(long, default_value = "transparent")]
        vault_type: VaultType,
    },
    /// Submit an order intent from a JSON weights file (strategist key).
    SubmitOrder {
        #[arg(long)]
        order_intent_path: PathBuf,
    },
    /// Replace the vault strategist (manager key).
    UpdateStrategist {
        #[arg(long)]
        new_strategist: Address,
    },
    /// Replace the vault fee model (manager key).
    UpdateFeeModel {
        #[arg(long)]
        fee_type: FeeType,
        #[arg(long)]
        performance_fee: u16,
        #[arg(long)]
        management_fee: u16,
    },
    /// Set or clear the deposit access control contract (manager key).
    SetDepositAccessControl {
        #[arg(long)]
        access_control: Address,
    },
    /// Print the vault's on-chain configuration as JSON.
    VaultInfo,
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .is_err()
    {}
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    setup_log();

    match run(cli).await {
        Ok(outcome) => {
            println!("{outcome}");
            exit(outcome.exit_code())
        }
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("Error: {e}");
            exit(e.exit_code())
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run(cli: Cli) -> Result<CommandOutcome, VaultError> {
    let settings = Settings::from_env()?;
    let vault = || cli.vault.map_or_else(|| settings.vault_address(), Ok);

    match cli.command {
        Command::DeployVault {
            name,
            symbol,
            fee_type,
            performance_fee,
            management_fee,
            strategist,
            deposit_access_control,
            vault_type,
        } => {
            let manager = settings.manager_key()?;
            let strategist = match strategist {
                Some(address) => address,
                None => settings.strategist_key()?.address(),
            };
            let request = DeployVaultRequest {
                vault_type,
                name,
                symbol,
                strategist,
                fees: FeeRequest::new(fee_type, performance_fee, management_fee),
                deposit_access_control,
            };
            request.validate()?;
            let ctx = CommandContext::connect(&settings).await?;
            commands::deploy_vault(&ctx, manager, &request).await
        }
        Command::SubmitOrder { order_intent_path } => {
            let strategist = settings.strategist_key()?;
            let vault = vault()?;
            let intent = AllocationIntent::from_file(&order_intent_path, settings.intent_tolerance)?;
            let ctx = CommandContext::connect(&settings).await?;
            commands::submit_intent(&ctx, strategist, vault, &intent).await
        }
        Command::UpdateStrategist { new_strategist } => {
            let manager = settings.manager_key()?;
            let vault = vault()?;
            let ctx = CommandContext::connect(&settings).await?;
            commands::update_strategist(&ctx, manager, vault, new_strategist).await
        }
        Command::UpdateFeeModel {
            fee_type,
            performance_fee,
            management_fee,
        } => {
            let manager = settings.manager_key()?;
            let vault = vault()?;
            let fees = FeeRequest::new(fee_type, performance_fee, management_fee);
            fees.validate_protocol_bounds()?;
            let ctx = CommandContext::connect(&settings).await?;
            commands::update_fee_model(&ctx, manager, vault, fees).await
        }
        Command::SetDepositAccessControl { access_control } => {
            let manager = settings.manager_key()?;
            let vault = vault()?;
            let ctx = CommandContext::connect(&settings).await?;
            commands::set_deposit_access_control(&ctx, manager, vault, access_control).await
        }
        Command::VaultInfo => {
            let vault = vault()?;
            let ctx = CommandContext::connect(&settings).await?;
            commands::vault_info(&ctx, vault).await
        }
    }
}
