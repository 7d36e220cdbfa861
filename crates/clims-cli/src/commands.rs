use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, warn};

use clims_core::auth::{open_storage, SessionManager};
use clims_core::cache::{AssetListView, CacheManager};
use clims_core::config::Config;
use clims_core::models::{
    Asset, AssetQuery, AssetStatus, ExportFormat, InventoryFilter, MaintenanceFilter,
    MaintenanceQuery, Page, PageRequest,
};
use clims_core::utils::{format_bytes, format_date, format_optional, truncate};
use clims_core::{ApiError, InventoryClient, SessionState};

#[derive(Debug, Parser)]
#[command(
    name = "clims",
    about = "Command-line client for the CLIMS IT asset tracking service",
    version,
    after_help = "Environment: CLIMS_API_BASE, CLIMS_REQUEST_TIMEOUT_SECS, CLIMS_STORAGE, RUST_LOG"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Report {
    Inventory,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Csv,
    Pdf,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => ExportFormat::Csv,
            Format::Pdf => ExportFormat::Pdf,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sign in (prompts for the password)
    Login {
        /// Defaults to the last username used
        username: Option<String>,
    },

    /// Sign out and clear the local session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List assets
    Assets {
        /// Page number, starting at 1
        #[arg(default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        /// Only assets with this status (e.g. available, under_repair)
        #[arg(long, short = 's')]
        status: Option<AssetStatus>,

        /// Free-text search
        #[arg(long, short = 'q')]
        search: Option<String>,
    },

    /// Show one asset with its audit trail
    Asset { id: i64 },

    /// Delete an asset
    Delete { id: i64 },

    /// Retire an asset
    Dispose {
        id: i64,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Show departments, locations and vendors
    Lookups,

    /// List maintenance records
    Maintenance,

    /// Show dashboard figures
    Kpis,

    /// Change your password
    ChangePassword,

    /// Download a report
    Export {
        #[arg(value_enum)]
        report: Report,

        #[arg(value_enum, ignore_case = true)]
        format: Format,

        /// Output file
        path: PathBuf,
    },
}

/// Everything a command needs, built once per run
pub struct Context {
    config: Config,
    session: Arc<SessionManager>,
    inventory: InventoryClient,
    assets: AssetListView,
    cache: Option<CacheManager>,
}

impl Context {
    pub async fn open(config: Config) -> Result<Self> {
        let storage = open_storage(&config).context("Failed to open token storage")?;
        let session = Arc::new(SessionManager::new(&config, storage)?);
        let state = session.init().await?;
        debug!(?state, "Session restored");

        let cache = match Config::cache_dir().and_then(CacheManager::new) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Cache unavailable");
                None
            }
        };

        let inventory = InventoryClient::new(session.clone());
        Ok(Self {
            assets: AssetListView::new(inventory.clone()),
            inventory,
            config,
            session,
            cache,
        })
    }

    pub async fn execute(mut self, command: Command) -> Result<()> {
        match command {
            Command::Login { username } => self.login(username).await,
            Command::Logout => self.logout().await,
            Command::Whoami => self.whoami().await,
            Command::Assets {
                page,
                status,
                search,
            } => self.assets(page, status, search).await,
            Command::Asset { id } => self.asset(id).await,
            Command::Delete { id } => self.delete(id).await,
            Command::Dispose { id, reason } => self.dispose(id, reason).await,
            Command::Lookups => self.lookups().await,
            Command::Maintenance => self.maintenance().await,
            Command::Kpis => self.kpis().await,
            Command::ChangePassword => self.change_password().await,
            Command::Export {
                report,
                format,
                path,
            } => self.export(report, format.into(), path).await,
        }
    }

    // ===== Session =====

    async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(username) => username,
            None => prompt("Username: ")?,
        };
        if username.is_empty() {
            bail!("Username is required");
        }

        let password = rpassword::prompt_password(format!("Password for {}: ", username))
            .context("Failed to read password")?;

        let identity = match self.session.login(&username, &password).await {
            Ok(identity) => identity,
            Err(ApiError::InvalidCredentials) => bail!("Invalid username or password"),
            Err(ApiError::AccountLocked(message)) => bail!("Account locked: {}", message),
            Err(e) => return Err(e).context("Login failed"),
        };

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to remember username");
        }

        println!(
            "Signed in as {} ({})",
            identity.username,
            identity.role.map(|r| r.as_str()).unwrap_or("no role")
        );
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        if !self.session.is_signed_in().await {
            println!("Not signed in");
            return Ok(());
        }
        self.session.logout().await;
        if let Some(ref cache) = self.cache {
            if let Err(e) = cache.clear() {
                warn!(error = %e, "Failed to clear cache");
            }
        }
        println!("Signed out");
        Ok(())
    }

    async fn whoami(&self) -> Result<()> {
        if self.session.state() == SessionState::SignedOut {
            println!("Not signed in");
            return Ok(());
        }

        if let Some(identity) = self.session.identity().await {
            println!("User:       {}", identity.username);
            println!("Email:      {}", format_optional(identity.email.as_deref(), "-"));
            println!(
                "Role:       {}",
                identity.role.map(|r| r.as_str()).unwrap_or("-")
            );
            println!("Department: {}", format_optional(identity.department.as_deref(), "-"));
        }
        if let Some(credential) = self.session.credential().await {
            let minutes = credential.minutes_until_expiry(Utc::now());
            if minutes > 0 {
                println!("Access token expires in {} min", minutes);
            } else {
                println!("Access token expired; it will be refreshed on the next call");
            }
        }
        Ok(())
    }

    async fn change_password(&self) -> Result<()> {
        let current = rpassword::prompt_password("Current password: ")
            .context("Failed to read password")?;
        let new = rpassword::prompt_password("New password: ").context("Failed to read password")?;
        let confirm =
            rpassword::prompt_password("Repeat new password: ").context("Failed to read password")?;
        if new != confirm {
            bail!("Passwords do not match");
        }
        if new.is_empty() {
            bail!("New password must not be empty");
        }

        let current = Some(current.as_str()).filter(|c| !c.is_empty());
        let message = self
            .session
            .change_password(current, &new)
            .await
            .context("Failed to change password")?;
        println!("{}", message.unwrap_or_else(|| "Password changed".to_string()));
        Ok(())
    }

    // ===== Assets =====

    async fn assets(
        &self,
        page: u32,
        status: Option<AssetStatus>,
        search: Option<String>,
    ) -> Result<()> {
        let filtered = status.is_some() || search.is_some();
        let query = AssetQuery {
            page: PageRequest::new(page - 1, 20),
            status,
            q: search,
            ..Default::default()
        };

        match self.assets.load(&query).await {
            Ok(Some(assets)) => {
                print_assets(&assets.content);
                println!("{}", assets.summary());
                // Only the unfiltered listing is kept for offline use
                if !filtered {
                    self.save_assets(&assets);
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(ApiError::Network(e)) => {
                let cached = self
                    .cache
                    .as_ref()
                    .and_then(|cache| cache.load_assets().ok().flatten());
                match cached {
                    Some(cached) => {
                        eprintln!("Backend unreachable, showing assets cached {}", cached.age_display());
                        print_assets(&cached.data.content);
                        println!("{}", cached.data.summary());
                        Ok(())
                    }
                    None => Err(ApiError::Network(e)).context("Failed to list assets"),
                }
            }
            Err(e) => Err(e).context("Failed to list assets"),
        }
    }

    /// Delete an asset, keeping the cached listing in step
    async fn delete(&self, id: i64) -> Result<()> {
        let cached = self.show_cached_assets().await;
        self.assets
            .delete(id)
            .await
            .with_context(|| format!("Failed to delete asset {}", id))?;
        if cached {
            self.save_assets(&self.assets.page().await);
        }
        println!("Deleted asset {}", id);
        Ok(())
    }

    async fn dispose(&self, id: i64, reason: Option<String>) -> Result<()> {
        let cached = self.show_cached_assets().await;
        let asset = self
            .assets
            .dispose(id, reason.as_deref())
            .await
            .with_context(|| format!("Failed to dispose asset {}", id))?;
        if cached {
            self.save_assets(&self.assets.page().await);
        }
        println!(
            "{} is now {}",
            asset.label(),
            asset.status.map(|s| s.display_name()).unwrap_or("-")
        );
        Ok(())
    }

    /// Seed the asset view from the offline cache; true if there was a listing
    async fn show_cached_assets(&self) -> bool {
        let cached = self
            .cache
            .as_ref()
            .and_then(|cache| cache.load_assets().ok().flatten());
        match cached {
            Some(cached) => {
                self.assets.show(cached.data).await;
                true
            }
            None => false,
        }
    }

    fn save_assets(&self, assets: &Page<Asset>) {
        if let Some(ref cache) = self.cache {
            if let Err(e) = cache.save_assets(assets) {
                warn!(error = %e, "Failed to cache assets");
            }
        }
    }

    async fn asset(&self, id: i64) -> Result<()> {
        let asset = self
            .inventory
            .get_asset(id)
            .await
            .with_context(|| format!("Failed to load asset {}", id))?;

        println!("{} (#{})", asset.label(), asset.id);
        println!("  Serial:     {}", format_optional(asset.serial_number.as_deref(), "-"));
        println!("  Make/model: {}", asset.make_model());
        println!(
            "  Status:     {}",
            asset.status.map(|s| s.display_name()).unwrap_or("-")
        );
        println!("  Assigned:   {}", format_optional(asset.assigned_to.as_deref(), "unassigned"));
        println!("  Location:   {}", format_optional(asset.location.as_deref(), "-"));
        println!("  Department: {}", format_optional(asset.department.as_deref(), "-"));
        println!("  Vendor:     {}", format_optional(asset.vendor.as_deref(), "-"));

        if let Some(identity) = self.session.identity().await {
            let mut actions = Vec::new();
            if identity.can_edit_asset(&asset) {
                actions.push("edit");
            }
            if identity.can_assign_asset(&asset) {
                actions.push(if asset.is_assigned() { "unassign" } else { "assign" });
            }
            if identity.can_dispose_asset(&asset) && asset.status != Some(AssetStatus::Retired) {
                actions.push("dispose");
            }
            if identity.can_delete_asset(&asset) {
                actions.push("delete");
            }
            if !actions.is_empty() {
                println!("  You can:    {}", actions.join(", "));
            }
        }

        match self.inventory.asset_audit(id).await {
            Ok(entries) if !entries.is_empty() => {
                println!();
                println!("Audit trail:");
                for entry in entries {
                    println!(
                        "  {}  {:<12} {:<12} {}",
                        entry
                            .timestamp
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        entry.action,
                        format_optional(entry.user.as_deref(), "-"),
                        truncate(entry.details.as_deref().unwrap_or(""), 60)
                    );
                }
            }
            Ok(_) => {}
            // Only some roles may read the audit trail
            Err(ApiError::Forbidden(_)) => debug!("Audit trail not permitted"),
            Err(e) => return Err(e).context("Failed to load audit trail"),
        }
        Ok(())
    }

    // ===== Reference data =====

    async fn lookups(&self) -> Result<()> {
        let cached = match self.cache {
            Some(ref cache) if !cache.lookups_stale() => cache.load_lookups().ok().flatten(),
            _ => None,
        };

        let lookups = match cached {
            Some(cached) => {
                debug!(age = %cached.age_display(), "Using cached lookups");
                cached.data
            }
            None => {
                let lookups = self.inventory.lookups().await.context("Failed to load lookups")?;
                if let Some(ref cache) = self.cache {
                    if let Err(e) = cache.save_lookups(&lookups) {
                        warn!(error = %e, "Failed to cache lookups");
                    }
                }
                lookups
            }
        };

        println!("Departments:");
        for department in &lookups.departments {
            println!("  {:>4}  {}", department.id, department.name);
        }
        println!("Locations:");
        for location in &lookups.locations {
            println!("  {:>4}  {}", location.id, location.display_name());
        }
        println!("Vendors:");
        for vendor in &lookups.vendors {
            println!(
                "  {:>4}  {}  {}",
                vendor.id,
                vendor.name,
                format_optional(vendor.email.as_deref(), "")
            );
        }
        Ok(())
    }

    async fn maintenance(&self) -> Result<()> {
        let records = self
            .inventory
            .list_maintenance(&MaintenanceQuery {
                page: PageRequest::new(0, 20),
                ..Default::default()
            })
            .await
            .context("Failed to list maintenance records")?;

        for record in &records.content {
            println!(
                "{:>5}  {:<12} {:<12} {:<14} {}",
                record.id,
                format_optional(record.asset_tag.as_deref(), "-"),
                record.status.map(|s| s.as_str()).unwrap_or("-"),
                format_date(record.scheduled_date),
                truncate(record.description.as_deref().unwrap_or(""), 50)
            );
        }
        println!("{}", records.summary());
        Ok(())
    }

    // ===== Reports =====

    async fn kpis(&self) -> Result<()> {
        let kpis = self.inventory.kpis().await.context("Failed to load KPIs")?;
        println!("Total assets:          {}", kpis.total_assets);
        for status in AssetStatus::ALL {
            println!("  {:<20} {}", status.display_name(), kpis.count_for(status));
        }
        println!("Upcoming maintenance:  {}", kpis.upcoming_maintenance);
        Ok(())
    }

    async fn export(&self, report: Report, format: ExportFormat, path: PathBuf) -> Result<()> {
        if let Some(identity) = self.session.identity().await {
            if !identity.can_export_reports() {
                bail!("Your role cannot export reports");
            }
        }

        let bytes = match report {
            Report::Inventory => {
                self.inventory
                    .export_inventory(format, &InventoryFilter::default())
                    .await
            }
            Report::Maintenance => {
                self.inventory
                    .export_maintenance(format, &MaintenanceFilter::default())
                    .await
            }
        }
        .context("Export failed")?;

        std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved {} to {}", format_bytes(bytes.len()), path.display());
        Ok(())
    }
}

fn print_assets(assets: &[Asset]) {
    if assets.is_empty() {
        println!("No assets");
        return;
    }
    println!(
        "{:>5}  {:<12} {:<28} {:<13} {:<16} {}",
        "ID", "TAG", "MAKE/MODEL", "STATUS", "ASSIGNED", "LOCATION"
    );
    for asset in assets {
        println!(
            "{:>5}  {:<12} {:<28} {:<13} {:<16} {}",
            asset.id,
            truncate(&asset.label(), 12),
            truncate(&asset.make_model(), 28),
            asset.status.map(|s| s.display_name()).unwrap_or("-"),
            truncate(asset.assigned_to.as_deref().unwrap_or("-"), 16),
            format_optional(asset.location.as_deref(), "-")
        );
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("clims").chain(args.iter().copied())).map(|cli| cli.command)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse(&["login", "admin"]).unwrap(),
            Command::Login {
                username: Some("admin".to_string())
            }
        );
        assert_eq!(
            parse(&["assets"]).unwrap(),
            Command::Assets {
                page: 1,
                status: None,
                search: None
            }
        );
        assert_eq!(
            parse(&["assets", "3", "--status", "under_repair", "-q", "dell"]).unwrap(),
            Command::Assets {
                page: 3,
                status: Some(AssetStatus::UnderRepair),
                search: Some("dell".to_string())
            }
        );
        assert_eq!(parse(&["asset", "42"]).unwrap(), Command::Asset { id: 42 });
        assert_eq!(
            parse(&["dispose", "7", "--reason", "water damage"]).unwrap(),
            Command::Dispose {
                id: 7,
                reason: Some("water damage".to_string())
            }
        );
        assert_eq!(
            parse(&["export", "maintenance", "PDF", "out.pdf"]).unwrap(),
            Command::Export {
                report: Report::Maintenance,
                format: Format::Pdf,
                path: PathBuf::from("out.pdf"),
            }
        );
        assert_eq!(ExportFormat::from(Format::Csv), ExportFormat::Csv);
    }

    #[test]
    fn test_parse_errors() {
        use clap::error::ErrorKind;

        assert_eq!(
            parse(&[]).unwrap_err().kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
        assert_eq!(parse(&["assets", "0"]).unwrap_err().kind(), ErrorKind::ValueValidation);
        assert_eq!(parse(&["assets", "--status", "lost"]).unwrap_err().kind(), ErrorKind::ValueValidation);
        assert_eq!(parse(&["asset"]).unwrap_err().kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(
            parse(&["export", "inventory", "xls", "a.xls"]).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
        assert_eq!(parse(&["whoami", "extra"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
        assert_eq!(parse(&["frobnicate"]).unwrap_err().kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
