mod auth;
mod config;
mod contact;
mod employees;
mod error;
mod estates;
mod format;
mod models;
mod reviews;
mod store;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use auth::{AuthClient, MemoryAuth, SessionObserver, SupabaseAuth};
use config::Config;
use contact::{submit_contact, subscribe_newsletter, validate_credentials, ContactForm};
use estates::{EstateCatalog, EstateQuery, SortOrder};
use format::{days_since, format_day_month_year, format_month_year, format_price};
use models::{Estate, NewReview, Review, ReviewPatch};
use reviews::Reviews;
use store::{AccessToken, MemoryStore, RemoteStore, SupabaseStore};

/// Number of listings on the front page
const HOME_LISTINGS: usize = 3;

#[derive(Parser)]
#[command(name = "homelands")]
#[command(about = "Browse Homelands estate listings, reviews and staff")]
#[command(version)]
struct Cli {
    /// Use built-in demo data instead of the hosted backend
    #[arg(long, global = true)]
    demo: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Front page: featured listings, reviews and staff
    Home,

    /// List estates for sale
    Estates {
        /// Filter by address, city or estate type
        #[arg(long)]
        filter: Option<String>,

        /// price_asc, price_desc, size or days_desc
        #[arg(long)]
        sort: Option<SortOrder>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one estate
    Estate { id: i64 },

    /// Search by address, city or estate type
    Search { query: String },

    /// List staff
    Employees,

    /// Send a message to an employee
    Contact {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        /// Employee id
        #[arg(long)]
        employee: Option<i64>,
        #[arg(long, default_value = "")]
        message: String,
    },

    /// Sign up for the newsletter
    Newsletter { email: String },

    Login {
        #[command(flatten)]
        credentials: Credentials,
    },

    Register {
        #[command(flatten)]
        credentials: Credentials,
    },

    Logout,

    /// Show the signed-in user and their reviews
    User {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Write, edit or delete your reviews
    Review {
        #[command(subcommand)]
        action: ReviewAction,

        #[command(flatten)]
        credentials: Credentials,
    },
}

#[derive(Subcommand)]
enum ReviewAction {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    Delete { id: i64 },
}

/// Sign in as part of the command instead of relying on a stored session
#[derive(Args, Clone, Default)]
struct Credentials {
    #[arg(long, global = true)]
    email: Option<String>,
    #[arg(long, global = true)]
    password: Option<String>,
}

/// Backend clients wired together at start-up
struct App {
    store: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthClient>,
    json: bool,
}

impl App {
    fn connect(demo: bool, json: bool) -> Result<Self> {
        if demo {
            return Ok(Self {
                store: Arc::new(MemoryStore::demo()),
                auth: Arc::new(MemoryAuth::demo()),
                json,
            });
        }

        let config = Config::load().context("Failed to load configuration")?;
        info!("Connecting to {}", config.api_url);

        let token = AccessToken::default();
        let store = SupabaseStore::new(config.clone(), token.clone())?;
        let auth = SupabaseAuth::new(config, token)?;

        Ok(Self {
            store: Arc::new(store),
            auth: Arc::new(auth),
            json,
        })
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = App::connect(cli.demo, cli.json)?;
    info!("🏠 Homelands ({})", app.store.backend_name());

    let observer = SessionObserver::start(app.auth.clone()).await;
    debug!("Session at start-up: {:?}", observer.state());
    let result = run(&app, &observer, cli.command).await;
    observer.stop();
    result
}

async fn run(app: &App, observer: &SessionObserver, command: Commands) -> Result<()> {
    let catalog = EstateCatalog::new(app.store.clone());

    match command {
        Commands::Home => {
            let estates = catalog
                .fetch_with(&EstateQuery {
                    limit: Some(HOME_LISTINGS),
                    ..Default::default()
                })
                .await?;
            // A failed review load only blanks that section of the page
            let mut reviews = Reviews::new(app.store.clone());
            if reviews.load().await.is_err() {
                debug!("Showing front page without reviews");
            }
            let staff = employees::fetch_employees(app.store.as_ref()).await?;

            let page = serde_json::json!({
                "estates": estates,
                "reviews": {
                    "items": reviews.items(),
                    "loading": reviews.loading(),
                    "error": reviews.error(),
                },
                "employees": staff,
            });
            app.print(&page, || {
                println!("Udvalgte boliger\n");
                print_estates(&estates);
                println!("Det siger vores kunder\n");
                match reviews.error() {
                    Some(error) => println!("Error: {}\n", error),
                    None => print_reviews(reviews.items(), format_month_year),
                }
                println!("Mød vores ansatte\n");
                for employee in &staff {
                    println!("{} - {}", employee.full_name(), employee.position);
                }
            })?;
        }

        Commands::Estates { filter, sort, limit } => {
            let estates = catalog
                .fetch_with(&EstateQuery {
                    text: filter,
                    sort,
                    limit,
                })
                .await?;
            app.print(&estates, || {
                println!("Boliger til salg\n");
                print_estates(&estates);
            })?;
        }

        Commands::Estate { id } => {
            let estate = catalog.find(id).await?;
            app.print(&estate, || print_estate_details(&estate))?;
        }

        Commands::Search { query } => {
            let estates = catalog.fetch(Some(query.as_str())).await?;
            app.print(&estates, || {
                if estates.is_empty() {
                    println!("No results found for {}.", query);
                } else {
                    println!("Search Results\n");
                    print_estates(&estates);
                }
            })?;
        }

        Commands::Employees => {
            let staff = employees::fetch_employees(app.store.as_ref()).await?;
            app.print(&staff, || {
                for employee in &staff {
                    println!("{}. {}", employee.id, employee.full_name());
                    println!("   {}", employee.position);
                    println!("   Mobil: {}", employee.phone);
                    println!("   Email: {}", employee.email);
                    println!();
                }
            })?;
        }

        Commands::Contact {
            name,
            email,
            employee,
            message,
        } => {
            let form = ContactForm {
                name,
                email,
                employee_id: employee,
                message,
            };
            submit_contact(app.store.as_ref(), &form).await?;
            println!("Besked sendt!");
        }

        Commands::Newsletter { email } => {
            subscribe_newsletter(app.store.as_ref(), &email).await?;
            println!("Tak for din tilmelding!");
        }

        Commands::Login { credentials } => {
            sign_in(app, observer, &credentials).await?;
            println!("Logget ind som {}", observer.handle().user_email().unwrap_or_default());
        }

        Commands::Register { credentials } => {
            let (email, password) = credentials_pair(&credentials)?;
            match app.auth.sign_up(email, password).await? {
                Some(_) => println!("Registration successful! You are now signed in."),
                None => println!("Registration successful! Confirm your email, then log in."),
            }
        }

        Commands::Logout => {
            observer.logout().await?;
            println!("Logget ud");
        }

        Commands::User { credentials } => {
            let user_id = require_user(app, observer, &credentials).await?;
            let mut reviews = Reviews::new(app.store.clone());
            reviews.load().await?;
            let own: Vec<&Review> = reviews.for_user(&user_id).collect();

            app.print(&own, || {
                println!("Logget ind som {}\n", observer.handle().user_email().unwrap_or_default());
                if own.is_empty() {
                    println!("Du har ikke skrevet nogen anmeldelser endnu.");
                } else {
                    println!("Dine anmeldelser\n");
                    print_reviews(own.iter().copied(), format_day_month_year);
                }
            })?;
        }

        Commands::Review {
            action,
            credentials,
        } => {
            let user_id = require_user(app, observer, &credentials).await?;
            let mut reviews = Reviews::new(app.store.clone());
            reviews.load().await?;

            match action {
                ReviewAction::Add {
                    name,
                    title,
                    content,
                } => {
                    if [&name, &title, &content].iter().any(|f| f.trim().is_empty()) {
                        bail!("Navn, titel og indhold skal udfyldes");
                    }
                    reviews
                        .add(NewReview {
                            name,
                            title,
                            content,
                            user_id,
                            created_at: Some(Utc::now()),
                        })
                        .await?;
                    println!("Anmeldelse gemt");
                }
                ReviewAction::Edit { id, title, content } => {
                    owned(&reviews, &user_id, id)?;
                    let patch = ReviewPatch { title, content };
                    if patch.is_empty() {
                        bail!("Nothing to update: pass --title and/or --content");
                    }
                    reviews.update(id, patch).await?;
                    println!("Anmeldelse opdateret");
                }
                ReviewAction::Delete { id } => {
                    owned(&reviews, &user_id, id)?;
                    reviews.delete(id).await?;
                    println!("Anmeldelse slettet");
                }
            }
        }
    }

    Ok(())
}

fn credentials_pair(credentials: &Credentials) -> Result<(&str, &str)> {
    let email = credentials.email.as_deref().unwrap_or("");
    let password = credentials.password.as_deref().unwrap_or("");
    validate_credentials(email, password)?;
    Ok((email, password))
}

async fn sign_in(app: &App, observer: &SessionObserver, credentials: &Credentials) -> Result<()> {
    let (email, password) = credentials_pair(credentials)?;
    app.auth.sign_in_with_password(email, password).await?;
    observer.login(email);
    Ok(())
}

/// Id of the signed-in user, signing in first when credentials were given
async fn require_user(app: &App, observer: &SessionObserver, credentials: &Credentials) -> Result<String> {
    if credentials.email.is_some() || credentials.password.is_some() {
        sign_in(app, observer, credentials).await?;
    }

    let handle = observer.handle();
    if !handle.is_logged_in() {
        bail!("Not logged in: run `homelands login` or pass --email and --password");
    }
    match handle.user_id() {
        Some(id) => Ok(id),
        None => bail!("Session has no user id yet, try again"),
    }
}

/// Reviews may only be changed by the user who wrote them
fn owned(reviews: &Reviews, user_id: &str, id: i64) -> Result<()> {
    if reviews.for_user(user_id).any(|review| review.id == Some(id)) {
        Ok(())
    } else {
        debug!("Review {} is not owned by {}", id, user_id);
        bail!("Review {} not found among your reviews", id)
    }
}

fn print_estates(estates: &[Estate]) {
    for (i, estate) in estates.iter().enumerate() {
        println!(
            "{}. {} ({} DKK)",
            i + 1,
            estate.address.as_deref().unwrap_or("-"),
            estate.price.map(format_price).unwrap_or_else(|| "-".to_string())
        );
        if let Some(city) = &estate.city {
            println!("   {} {}", estate.zipcode.as_deref().unwrap_or(""), city);
        }
        if let Some(kind) = &estate.estate_type {
            println!("   {}", kind);
        }
        println!(
            "   {} værelser, {} m2",
            estate.num_rooms.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
            estate.floor_space.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
        );
        if let Some(label) = &estate.energy_label {
            println!("   Energimærke: {}", label);
        }
        println!("   ID: {}", estate.id);
        println!();
    }
}

fn print_estate_details(estate: &Estate) {
    let price = |value: Option<f64>| value.map(format_price).unwrap_or_else(|| "-".to_string());
    let number = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    println!("{}", estate.address.as_deref().unwrap_or("-"));
    println!(
        "{} {}",
        estate.zipcode.as_deref().unwrap_or(""),
        estate.city.as_deref().unwrap_or("")
    );
    println!("{}", estate.estate_type.as_deref().unwrap_or(""));
    println!("Set {} gange\n", estate.num_clicks.unwrap_or(0));

    println!("Kontantpris      {}", price(estate.price));
    println!("Udbetaling       {}", price(estate.payout));
    println!("Brutto ex. ejerudgift {}", price(estate.gross));
    println!("Netto ex. ejerudgift  {}", price(estate.net));
    println!("Ejerudgift per måned  {}\n", price(estate.cost));

    println!("Sagsnr.          {}", estate.id);
    println!("Boligareal       {} m2", number(estate.floor_space.map(|n| n.to_string())));
    println!("Grundareal       {} m2", number(estate.ground_space.map(|n| n.to_string())));
    println!("Kælder           {} m2", number(estate.basement_space.map(|n| n.to_string())));
    println!("Antal rum        {}", number(estate.num_rooms.map(|n| n.to_string())));
    println!("Antal plan       {}", number(estate.num_floors.map(|n| n.to_string())));
    println!("Byggeår          {}", number(estate.year_construction.map(|n| n.to_string())));
    println!("Ombygget         {}", number(estate.year_rebuilt.map(|n| n.to_string())));
    println!("Energimærke      {}", estate.energy_label.as_deref().unwrap_or("-"));
    if let Some(created_at) = estate.created_at {
        println!("Liggetid         {} dage", days_since(created_at, Utc::now()));
    }
    if let Some((lat, lon)) = estate.coordinates() {
        println!("Placering        {:.5}, {:.5}", lat, lon);
    }
    println!("Billeder         {}", estate.images.len());
    if let Some(image) = estate.primary_image() {
        println!("Forsidebillede   {}", image);
    }
    if let Some(floorplan) = &estate.floorplan {
        println!("Plantegning      {}", floorplan);
    }

    if let Some(description) = &estate.description {
        println!("\n{}", description);
    }

    if let Some(employee) = &estate.employee {
        println!("\nKontakt");
        println!("{}", employee.full_name());
        println!("{}", employee.position);
        println!("Mobil: {}", employee.phone);
        println!("Email: {}", employee.email);
    }
}

fn print_reviews<'a>(
    reviews: impl IntoIterator<Item = &'a Review>,
    date_format: fn(DateTime<Utc>) -> String,
) {
    for review in reviews {
        println!("\"{}\"", review.title);
        println!("{}", review.content);
        match review.created_at {
            Some(date) => println!("- {}, {}", review.name, date_format(date)),
            None => println!("- {}", review.name),
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn estates_filter_describes_full_text_match() {
        let cli = Cli::command();
        let estates = cli.find_subcommand("estates").unwrap();
        let filter = estates
            .get_arguments()
            .find(|arg| arg.get_id() == "filter")
            .unwrap();
        assert_eq!(
            filter.get_help().unwrap().to_string(),
            "Filter by address, city or estate type"
        );

        let parsed = Cli::try_parse_from(["homelands", "--demo", "estates", "--filter", "gade 1 "]).unwrap();
        match parsed.command {
            Commands::Estates { filter, .. } => assert_eq!(filter.as_deref(), Some("gade 1 ")),
            _ => panic!("expected estates command"),
        }
    }
}
