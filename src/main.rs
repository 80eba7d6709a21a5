use clap::{Parser, Subcommand};
use clinic_checkout::application::engine::{CheckoutEngine, CheckoutRequest, Dependencies};
use clinic_checkout::application::session_store::RegistrationPatch;
use clinic_checkout::config::Config;
use clinic_checkout::domain::money::Amount;
use clinic_checkout::domain::plan::PlanTier;
use clinic_checkout::domain::ports::{GatewayBox, SessionStorageBox};
use clinic_checkout::domain::session::CustomerInfo;
use clinic_checkout::error::CheckoutError;
use clinic_checkout::infrastructure::file::JsonFileStorage;
use clinic_checkout::infrastructure::http_gateway::HttpGateway;
use clinic_checkout::infrastructure::in_memory::InMemorySessionStorage;
use clinic_checkout::infrastructure::providers::CallbackSigner;
#[cfg(feature = "storage-rocksdb")]
use clinic_checkout::infrastructure::rocksdb::RocksDbSessionStorage;
use clinic_checkout::infrastructure::simulated_gateway::SimulatedGateway;
use clinic_checkout::interfaces::csv::method_writer::MethodWriter;
use clinic_checkout::interfaces::notifier::TracingNotifier;
use miette::{IntoDiagnostic, Result, miette};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the durable session record (overrides CLINIC_STATE_DIR)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Path to a RocksDB database used as the durable tier instead of JSON files
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List payment methods, recommended first
    Methods {
        /// Price every method for this amount (minor units)
        #[arg(long)]
        amount: Option<i64>,
        /// Emit CSV instead of a table
        #[arg(long)]
        csv: bool,
    },
    /// List plan tiers
    Plans,
    /// Pay for a plan and start a session
    Checkout {
        #[arg(long, default_value_t = PlanTier::Professional)]
        plan: PlanTier,
        #[arg(long, default_value = "bank_transfer")]
        method: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "-")]
        phone: String,
        #[arg(long)]
        clinic: String,
    },
    /// Adopt a login result (JSON file, `-` for stdin) as the session
    Login { file: PathBuf },
    /// Complete registration for the active session
    Register {
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        contact_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        clinic_name: Option<String>,
        #[arg(long)]
        remember_me: bool,
    },
    /// Ask the provider for the latest payment status
    Status {
        /// Keep polling up to this many times while the payment is pending
        #[arg(long)]
        wait: Option<u32>,
    },
    /// Confirm that a manual transfer arrived
    Confirm { reference: String },
    /// Apply a signed provider callback (JSON file, `-` for stdin)
    Callback {
        file: PathBuf,
        #[arg(long)]
        signature: String,
    },
    /// Print the signature the merchant secret gives a callback payload
    Sign { file: PathBuf },
    /// Resolve a navigation through the routing guard
    Route { path: String },
    /// Print the active session
    Show,
    /// Remove the session from every tier
    SignOut,
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "clinic_checkout=info".into());

    let is_json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let json_layer = is_json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(io::stderr)
    });
    let text_layer = (!is_json).then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn read_json(path: &Path) -> Result<Value> {
    let mut contents = String::new();
    if path == Path::new("-") {
        io::stdin().read_to_string(&mut contents).into_diagnostic()?;
    } else {
        contents = std::fs::read_to_string(path).into_diagnostic()?;
    }
    serde_json::from_str(&contents).into_diagnostic()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn rocksdb_tier(cli: &Cli) -> Result<Option<SessionStorageBox>> {
    match &cli.db_path {
        Some(db_path) => {
            let store = RocksDbSessionStorage::open(db_path).into_diagnostic()?;
            Ok(Some(Arc::new(store)))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn rocksdb_tier(_cli: &Cli) -> Result<Option<SessionStorageBox>> {
    Ok(None)
}

fn durable_tier(cli: &Cli, config: &Config) -> Result<SessionStorageBox> {
    if let Some(tier) = rocksdb_tier(cli)? {
        return Ok(tier);
    }
    let dir = cli.state_dir.as_ref().unwrap_or(&config.state_dir);
    Ok(Arc::new(JsonFileStorage::new(dir)))
}

fn gateway(config: &Config) -> Result<GatewayBox> {
    match &config.gateway_url {
        Some(url) => {
            let api_key = config
                .gateway_api_key
                .as_ref()
                .map(|k| SecretString::from(k.expose_secret().to_string()));
            Ok(Arc::new(HttpGateway::new(url.clone(), api_key).into_diagnostic()?))
        }
        None => Ok(Arc::new(SimulatedGateway::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().into_diagnostic()?;

    let engine = CheckoutEngine::init(
        &config,
        Dependencies {
            durable: durable_tier(&cli, &config)?,
            tab_scoped: Arc::new(InMemorySessionStorage::new()),
            gateway: gateway(&config)?,
            notifier: Arc::new(TracingNotifier),
        },
    )
    .await;

    match cli.command {
        Command::Methods { amount, csv } => {
            let amount = amount.map(Amount::new).transpose().into_diagnostic()?;
            if csv {
                let stdout = io::stdout();
                let mut writer = MethodWriter::new(stdout.lock());
                writer
                    .write_methods(engine.list_methods(), amount)
                    .into_diagnostic()?;
            } else {
                for method in engine.list_methods() {
                    let marker = if method.recommended { "*" } else { " " };
                    let priced = amount
                        .map(|a| format!("  total {}", a.plus(method.fee_rule.apply(a))))
                        .unwrap_or_default();
                    println!(
                        "{marker} {:<12} {:<26} fee {}{priced}",
                        method.id, method.display_name, method.fee_rule
                    );
                }
            }
        }
        Command::Plans => {
            let plans: Vec<_> = PlanTier::ALL.iter().map(|tier| tier.plan()).collect();
            print_json(&plans)?;
        }
        Command::Checkout {
            plan,
            method,
            name,
            email,
            phone,
            clinic,
        } => {
            let request = CheckoutRequest {
                plan: plan.plan(),
                customer: CustomerInfo {
                    contact_name: name,
                    email,
                    phone,
                    clinic_name: clinic,
                },
                method_id: method,
            };
            match engine.checkout(request).await {
                Ok(outcome) => print_json(&outcome)?,
                Err(CheckoutError::Provider(e)) => {
                    let hint = e
                        .fallback_method()
                        .map(|m| format!(" (try --method {m})"))
                        .unwrap_or_default();
                    return Err(miette!("{e}{hint}"));
                }
                Err(e) => return Err(e).into_diagnostic(),
            }
        }
        Command::Login { file } => {
            let raw = read_json(&file)?;
            print_json(&engine.login(&raw).await.into_diagnostic()?)?;
        }
        Command::Register {
            password,
            contact_name,
            phone,
            clinic_name,
            remember_me,
        } => {
            let patch = RegistrationPatch {
                password,
                contact_name,
                phone,
                clinic_name,
                remember_me: remember_me.then_some(true),
            };
            print_json(&engine.complete_registration(patch).await.into_diagnostic()?)?;
        }
        Command::Status { wait } => {
            let refreshed = match wait {
                Some(attempts) => {
                    engine
                        .poll_until_settled(engine.poll_interval(), attempts)
                        .await
                }
                None => engine.refresh_payment().await,
            };
            match refreshed {
                Ok(session) => print_json(&session)?,
                Err(CheckoutError::Provider(e)) if e.is_retryable() => {
                    tracing::warn!(error = %e, "Provider status unavailable; showing stored session");
                    let session = engine
                        .session()
                        .await
                        .ok_or_else(|| miette!("No active session"))?;
                    print_json(&session)?;
                }
                Err(e) => return Err(e).into_diagnostic(),
            }
        }
        Command::Confirm { reference } => {
            print_json(&engine.confirm_manual_transfer(&reference).await.into_diagnostic()?)?;
        }
        Command::Callback { file, signature } => {
            let payload = read_json(&file)?;
            print_json(
                &engine
                    .handle_callback(&payload, &signature)
                    .await
                    .into_diagnostic()?,
            )?;
        }
        Command::Sign { file } => {
            let payload = read_json(&file)?;
            let reference = payload
                .get("externalReference")
                .and_then(Value::as_str)
                .ok_or_else(|| miette!("payload has no externalReference"))?;
            let amount = payload
                .get("amount")
                .and_then(Value::as_i64)
                .ok_or_else(|| miette!("payload has no integer amount"))?;
            let signer = CallbackSigner::new(
                config.merchant_id.clone(),
                SecretString::from(config.callback_secret.expose_secret().to_string()),
            );
            println!("{}", signer.sign(reference, amount));
        }
        Command::Route { path } => {
            print_json(&engine.navigate(&path).await)?;
        }
        Command::Show => match engine.session().await {
            Some(session) => print_json(&session)?,
            None => return Err(miette!("No active session")),
        },
        Command::SignOut => {
            engine.sign_out().await.into_diagnostic()?;
            println!("Signed out");
        }
    }

    engine.teardown().await;
    Ok(())
}
