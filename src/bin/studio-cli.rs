use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;

use photo_studio::models::EventCategory;
use photo_studio::report::{MonthlyCount, ReportTable};
use photo_studio::wizard::{BookingDetails, BookingWizard, PaymentDetails};

const TOKEN_FILE: &str = ".studio_token";

#[derive(Parser)]
#[command(name = "studio-cli")]
#[command(about = "CLI for the photo studio API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, env = "STUDIO_URL", default_value = "http://localhost:5050")]
    url: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    Galleries,
    Services,
    Bookings,
}

impl ReportKind {
    fn path(&self) -> &'static str {
        match self {
            ReportKind::Galleries => "/api/gallery/report",
            ReportKind::Services => "/api/services/report",
            ReportKind::Bookings => "/api/bookings/report",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ReportKind::Galleries => "Gallery Available Report",
            ReportKind::Services => "Service Report",
            ReportKind::Bookings => "Booking Report",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    /// Public gallery listing
    Galleries {
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Bookings (admin)
    Bookings {
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Booking totals and counts (admin)
    Stats {
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long)]
        end_date: Option<String>,
    },
    /// Month x category table (admin)
    Report {
        #[arg(value_enum, default_value = "galleries")]
        kind: ReportKind,
    },
    /// Walk through the booking wizard and submit the booking
    Book {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        contact_number: String,
        #[arg(long)]
        email: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        start_time: String,
        #[arg(long)]
        end_time: String,
        /// Colombo, Kandy or Other
        #[arg(long, default_value = "Colombo")]
        location: String,
        #[arg(long)]
        guests: u32,
        #[arg(long, default_value_t = 3)]
        photographers: u32,
        #[arg(long)]
        venue: String,
        #[arg(long)]
        event_type: Option<EventCategory>,
        #[arg(long)]
        card_name: String,
        #[arg(long)]
        card_number: String,
        /// MM/YY
        #[arg(long)]
        expiry: String,
        #[arg(long)]
        cvv: String,
        #[arg(long, default_value = "123456")]
        otp: String,
        /// Also try the PDF invoice export
        #[arg(long)]
        pdf: bool,
    },
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

fn authorized(request: RequestBuilder) -> RequestBuilder {
    let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
    request.header("Authorization", format!("Bearer {}", token.trim()))
}

/// Query pairs with the unset options left out.
fn present<const N: usize>(pairs: [(&'static str, Option<String>); N]) -> Vec<(&'static str, String)> {
    pairs
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
}

async fn print_response(res: Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let body = serde_json::from_str::<Value>(&text)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or(text);
    if status.is_success() {
        println!("{body}");
    } else {
        println!("Request failed ({status}): {body}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let url = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Register { name, email, password } => {
            let res = client
                .post(format!("{url}/api/auth/register"))
                .json(&json!({ "name": name, "email": email, "password": password }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{url}/api/auth/login"))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: LoginResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logged in. Token saved to {TOKEN_FILE}");
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out (token removed).");
        }
        Commands::Galleries { category, search } => {
            let res = client
                .get(format!("{url}/api/gallery"))
                .query(&present([("category", category), ("search", search)]))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Bookings { status, search } => {
            let res = authorized(client.get(format!("{url}/api/bookings")))
                .query(&present([("status", status), ("search", search)]))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Stats { start_date, end_date } => {
            let res = authorized(client.get(format!("{url}/api/bookings/stats/overview")))
                .query(&present([("startDate", start_date), ("endDate", end_date)]))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Report { kind } => {
            let res = authorized(client.get(format!("{url}{}", kind.path())))
                .send()
                .await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }
            let rows: Vec<MonthlyCount> = res.json().await?;
            let table = ReportTable::for_event_categories(&rows);
            print!("{}", table.render(kind.title()));
        }
        Commands::Book {
            full_name,
            contact_number,
            email,
            date,
            start_time,
            end_time,
            location,
            guests,
            photographers,
            venue,
            event_type,
            card_name,
            card_number,
            expiry,
            cvv,
            otp,
            pdf,
        } => {
            let mut wizard = BookingWizard::new();

            let step = wizard.submit_booking(BookingDetails {
                full_name,
                contact_number,
                email,
                date,
                start_time,
                end_time,
                location,
                guests,
                photographers,
                venue,
                event_type,
            })?;
            println!("Step {}: {step}", step.number());

            let step = wizard.submit_payment(PaymentDetails {
                card_name,
                card_number,
                expiry,
                cvv,
            })?;
            println!("Step {}: {step} (card {})", step.number(), wizard.masked_card());

            let step = wizard.submit_otp(&otp)?;
            println!("Step {}: {step}", step.number());

            if let Some(invoice) = wizard.invoice() {
                println!("\n{}\n", invoice.summary());
                if pdf {
                    if let Err(err) = invoice.download() {
                        println!("Invoice download unavailable: {err}");
                    }
                }
            }

            if let Some(request) = wizard.booking_request() {
                let res = client
                    .post(format!("{url}/api/bookings"))
                    .json(&request)
                    .send()
                    .await?;
                print_response(res).await?;
            }
        }
    }

    Ok(())
}
