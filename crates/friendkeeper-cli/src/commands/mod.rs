pub mod checkout;
pub mod dashboard;
pub mod friend;
pub mod interaction;
pub mod starters;
pub mod tokens;

use friendkeeper_core::{Config, CreditLedger, Database, DeviceIdentity, IdentityResolver};

/// Shared handles for one CLI invocation.
///
/// The identity is resolved once per invocation and reused across every
/// operation the command performs.
pub struct Context {
    pub config: Config,
    pub db: Database,
    pub ledger: CreditLedger,
    pub identity: DeviceIdentity,
}

impl Context {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load();
        let db = Database::open()?;
        let ledger = CreditLedger::open(config.policy.free_trial_grant)?;
        let identity = IdentityResolver::new().resolve();
        Ok(Self {
            config,
            db,
            ledger,
            identity,
        })
    }
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
