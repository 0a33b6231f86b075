use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postula::config::Config;
use postula::session::Session;
use postula::{
    Application, ApplicationFilter, ApplicationId, ApplicationPatch, ApplicationStatus,
    ApplicationsState, Database, LocationType, NewApplication, OwnerId, Platform,
    SalaryCurrency, SalaryPeriod,
};

#[derive(Parser)]
#[command(name = "postula")]
#[command(about = "Track job applications per wallet - statuses, salaries, timelines and stats")]
struct Cli {
    /// Database file (defaults to $POSTULA_DB or the platform data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Act as this wallet instead of the connected one
    #[arg(long, global = true)]
    wallet: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Connect a wallet address for later commands
    Connect {
        /// Wallet address
        address: String,
    },

    /// Forget the connected wallet
    Disconnect,

    /// Show the connected wallet
    Whoami,

    /// Record a new application
    Add {
        /// Company name
        company: String,

        /// Position title
        position: String,

        /// Where you applied
        #[arg(short, long)]
        platform: Platform,

        /// Platform name when --platform is "otro"
        #[arg(long)]
        platform_other: Option<String>,

        /// Application date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Initial status, defaults to pendiente
        #[arg(short, long)]
        status: Option<ApplicationStatus>,

        #[arg(long)]
        salary_min: Option<f64>,

        #[arg(long)]
        salary_max: Option<f64>,

        #[arg(long)]
        currency: Option<SalaryCurrency>,

        #[arg(long)]
        period: Option<SalaryPeriod>,

        /// The posting did not mention salary
        #[arg(long)]
        salary_not_specified: bool,

        /// remoto, presencial or hibrido
        #[arg(short, long)]
        location: Option<LocationType>,

        /// City, for presencial positions
        #[arg(long)]
        city: Option<String>,

        /// Job posting URL
        #[arg(short, long)]
        url: Option<String>,

        /// Personal notes
        #[arg(short, long)]
        notes: Option<String>,

        /// Mark as priority
        #[arg(long)]
        priority: bool,
    },

    /// List applications
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<ApplicationStatus>,

        /// Filter by platform
        #[arg(short, long)]
        platform: Option<Platform>,

        /// Filter by modality (remoto, presencial, hibrido)
        #[arg(short, long)]
        modality: Option<LocationType>,

        /// Search company and position
        #[arg(short = 'q', long)]
        search: Option<String>,

        /// Only the N most recent
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show application details
    Show {
        /// Application ID
        id: String,
    },

    /// Edit fields of an application
    Edit {
        /// Application ID
        id: String,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        position: Option<String>,

        #[arg(long)]
        platform: Option<Platform>,

        #[arg(long)]
        platform_other: Option<String>,

        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        status: Option<ApplicationStatus>,

        #[arg(long)]
        salary_min: Option<f64>,

        #[arg(long)]
        salary_max: Option<f64>,

        #[arg(long)]
        currency: Option<SalaryCurrency>,

        #[arg(long)]
        period: Option<SalaryPeriod>,

        #[arg(long)]
        salary_not_specified: Option<bool>,

        #[arg(long)]
        location: Option<LocationType>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        priority: Option<bool>,

        /// Clear optional fields
        #[arg(long, value_enum, value_delimiter = ',')]
        clear: Vec<ClearField>,
    },

    /// Change status, optionally noting why in the timeline
    Status {
        /// Application ID
        id: String,

        /// New status
        status: ApplicationStatus,

        /// Timeline note
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Delete an application and its timeline
    Rm {
        /// Application ID
        id: String,
    },

    /// Show status history of an application
    Timeline {
        /// Application ID
        id: String,
    },

    /// Summary statistics
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Interview rate per platform
    Platforms,

    /// Companies applied to
    Companies,
}

#[derive(Clone, Copy, ValueEnum)]
enum ClearField {
    PlatformOther,
    Salary,
    Location,
    City,
    Url,
    Notes,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postula=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn current_owner(config: &Config, wallet: Option<&str>) -> Result<Option<OwnerId>> {
    match wallet {
        Some(address) => Ok(Some(OwnerId::parse(address)?)),
        None => Ok(Session::load(&config.session_path)
            .with_context(|| format!("Failed to read session {}", config.session_path.display()))?
            .wallet_address),
    }
}

fn open_state(config: &Config, wallet: Option<&str>) -> Result<ApplicationsState<Database>> {
    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    db.ensure_initialized()?;

    let mut state = ApplicationsState::new(db);
    state.set_owner(current_owner(config, wallet)?)?;
    Ok(state)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env().with_db_path(cli.db.clone());
    let wallet = cli.wallet.as_deref();

    match cli.command {
        Commands::Init => {
            let db = Database::open(&config.db_path)?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Connect { address } => {
            let owner = OwnerId::parse(&address)?;
            Session::connect(&config.session_path, owner.clone())?;
            println!("Connected as {}", owner);
        }

        Commands::Disconnect => {
            Session::disconnect(&config.session_path)?;
            println!("Disconnected.");
        }

        Commands::Whoami => match current_owner(&config, wallet)? {
            Some(owner) => println!("{}", owner),
            None => println!("No wallet connected. Run 'postula connect <address>'."),
        },

        Commands::Add {
            company,
            position,
            platform,
            platform_other,
            date,
            status,
            salary_min,
            salary_max,
            currency,
            period,
            salary_not_specified,
            location,
            city,
            url,
            notes,
            priority,
        } => {
            let mut state = open_state(&config, wallet)?;
            let fields = NewApplication {
                company_name: company,
                position_title: position,
                platform: Some(platform),
                platform_other,
                application_date: date,
                status,
                salary_min,
                salary_max,
                salary_currency: currency,
                salary_period: period,
                salary_not_specified,
                location_type: location,
                location_city: city,
                job_url: url,
                personal_notes: notes,
                is_priority: priority,
            };
            let app = state.create(fields)?;
            println!("Added application {} ({} at {})", app.id, app.position_title, app.company_name);
        }

        Commands::List {
            status,
            platform,
            modality,
            search,
            limit,
            json,
        } => {
            let state = open_state(&config, wallet)?;
            let filter = ApplicationFilter {
                search,
                status,
                platform,
                location_type: modality,
            };
            let mut apps = state.filtered(&filter);
            if let Some(limit) = limit {
                apps.truncate(limit);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&apps)?);
            } else if apps.is_empty() {
                if filter.is_active() {
                    println!("No applications match those filters.");
                } else {
                    println!("No applications yet. Add one with 'postula add'.");
                }
            } else {
                print_table(&apps);
                println!("\n{} of {} applications", apps.len(), state.applications().len());
            }
        }

        Commands::Show { id } => {
            let state = open_state(&config, wallet)?;
            let app = state.require(&ApplicationId::from(id.as_str()))?;
            print_detail(app);
        }

        Commands::Edit {
            id,
            company,
            position,
            platform,
            platform_other,
            date,
            status,
            salary_min,
            salary_max,
            currency,
            period,
            salary_not_specified,
            location,
            city,
            url,
            notes,
            priority,
            clear,
        } => {
            let mut patch = ApplicationPatch {
                company_name: company,
                position_title: position,
                platform,
                platform_other: platform_other.map(Some),
                application_date: date,
                status,
                salary_min: salary_min.map(Some),
                salary_max: salary_max.map(Some),
                salary_currency: currency.map(Some),
                salary_period: period.map(Some),
                salary_not_specified,
                location_type: location.map(Some),
                location_city: city.map(Some),
                job_url: url.map(Some),
                personal_notes: notes.map(Some),
                is_priority: priority,
            };
            for field in clear {
                match field {
                    ClearField::PlatformOther => patch.platform_other = Some(None),
                    ClearField::Salary => {
                        patch.salary_min = Some(None);
                        patch.salary_max = Some(None);
                        patch.salary_currency = Some(None);
                        patch.salary_period = Some(None);
                    }
                    ClearField::Location => {
                        patch.location_type = Some(None);
                        patch.location_city = Some(None);
                    }
                    ClearField::City => patch.location_city = Some(None),
                    ClearField::Url => patch.job_url = Some(None),
                    ClearField::Notes => patch.personal_notes = Some(None),
                }
            }
            if patch.is_empty() {
                println!("Nothing to change.");
                return Ok(());
            }

            let mut state = open_state(&config, wallet)?;
            let app = state.update(&ApplicationId::from(id.as_str()), patch)?;
            println!("Updated application {}", app.id);
        }

        Commands::Status { id, status, note } => {
            let mut state = open_state(&config, wallet)?;
            let app = state.update_status(&ApplicationId::from(id.as_str()), status, note.as_deref())?;
            println!("{} at {} is now {}", app.position_title, app.company_name, app.status.label());
        }

        Commands::Rm { id } => {
            let mut state = open_state(&config, wallet)?;
            let id = ApplicationId::from(id.as_str());
            state.remove(&id)?;
            println!("Removed application {}", id);
        }

        Commands::Timeline { id } => {
            let state = open_state(&config, wallet)?;
            let entries = state.get_timeline(&ApplicationId::from(id.as_str()))?;
            if entries.is_empty() {
                println!("No timeline entries for {}.", id);
            } else {
                println!("{:<20} {:<22} {:<22} {}", "WHEN", "FROM", "TO", "NOTES");
                println!("{}", "-".repeat(84));
                for entry in entries {
                    println!(
                        "{:<20} {:<22} {:<22} {}",
                        entry.changed_at.format("%Y-%m-%d %H:%M").to_string(),
                        entry.old_status.map(|s| s.label()).unwrap_or("-"),
                        entry.new_status.label(),
                        entry.notes.unwrap_or_default()
                    );
                }
            }
        }

        Commands::Stats { json } => {
            let state = open_state(&config, wallet)?;
            let stats = state.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Total applications: {}", stats.total);
                println!("This month:         {}", stats.this_month);
                println!("Last month:         {}", stats.last_month);
                println!("Response rate:      {:.1}%", stats.response_rate);
                println!();
                for status in ApplicationStatus::ALL {
                    println!("  {:<24} {:>5}", status.label(), stats.count(*status));
                }
            }
        }

        Commands::Platforms => {
            let state = open_state(&config, wallet)?;
            let platforms = state.platform_stats();
            if platforms.is_empty() {
                println!("No applications yet.");
            } else {
                println!("{:<22} {:>8} {:>12} {:>14}", "PLATFORM", "COUNT", "INTERVIEWS", "EFFECTIVENESS");
                println!("{}", "-".repeat(59));
                for entry in platforms {
                    println!(
                        "{:<22} {:>8} {:>12} {:>13.1}%",
                        entry.platform.label(),
                        entry.count,
                        entry.interviews,
                        entry.effectiveness
                    );
                }
            }
        }

        Commands::Companies => {
            let state = open_state(&config, wallet)?;
            for name in state.company_names() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

fn print_table(apps: &[&Application]) {
    println!(
        "{:<10} {:<12} {:<22} {:<24} {:<18} {:<10}",
        "ID", "DATE", "STATUS", "POSITION", "COMPANY", "PLATFORM"
    );
    println!("{}", "-".repeat(101));
    for app in apps {
        let marker = if app.is_priority { "*" } else { " " };
        println!(
            "{:<10} {:<12} {:<22} {:<24} {:<18} {:<10}",
            format!("{}{}", marker, truncate(app.id.as_str(), 8)),
            app.application_date.to_string(),
            app.status.label(),
            truncate(&app.position_title, 22),
            truncate(&app.company_name, 16),
            truncate(app.platform_name(), 10)
        );
    }
}

fn print_detail(app: &Application) {
    println!("Application {}", app.id);
    println!("Position: {}", app.position_title);
    println!("Company: {}", app.company_name);
    println!("Status: {}", app.status.label());
    println!("Platform: {}", app.platform_name());
    println!("Applied: {}", app.application_date);
    println!("Salary: {}", format_salary(app));
    if let Some(location) = app.location_type {
        match (location, &app.location_city) {
            (LocationType::Presencial, Some(city)) => println!("Location: {} ({})", location, city),
            _ => println!("Location: {}", location),
        }
    }
    if let Some(url) = &app.job_url {
        println!("URL: {}", url);
    }
    if app.is_priority {
        println!("Priority: yes");
    }
    println!("Created: {}", app.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", app.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(notes) = &app.personal_notes {
        println!("\n--- Notes ---");
        println!("{}", textwrap::fill(notes, 70));
    }
}

fn format_salary(app: &Application) -> String {
    if app.salary_not_specified {
        return "not specified".to_string();
    }
    let range = match (app.salary_min, app.salary_max) {
        (Some(min), Some(max)) => format!("{} - {}", min, max),
        (Some(min), None) => format!("{}+", min),
        (None, Some(max)) => format!("up to {}", max),
        (None, None) => return "-".to_string(),
    };
    let currency = app.salary_currency.map(|c| format!(" {}", c)).unwrap_or_default();
    let period = app.salary_period.map(|p| format!(" / {}", p)).unwrap_or_default();
    format!("{}{}{}", range, currency, period)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
