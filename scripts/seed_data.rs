//! Seed script for the photo studio store
//!
//! Inserts the studio's team roster and, when `ADMIN_EMAIL` and
//! `ADMIN_PASSWORD` are set, an admin account. Records whose email already
//! exists are left alone, so the script can be re-run.
//! Run: cargo run --bin seed_data

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use photo_studio::auth::hash_password;
use photo_studio::config::Config;
use photo_studio::models::{Availability, Profile, Role, Staff, User};
use photo_studio::storage::{new_id, Storage};

struct Member {
    name: &'static str,
    title: &'static str,
    email: &'static str,
    phone: &'static str,
    description: &'static str,
    hourly_rate: f64,
    specializations: [&'static str; 3],
}

const TEAM: &[Member] = &[
    Member {
        name: "U.Malshika",
        title: "Founder & Lead Photographer",
        email: "malshika@globalimage.com",
        phone: "+94 11 234 5678",
        description: "Over 15 years of experience in event and corporate photography. Specializes in corporate events and professional headshots.",
        hourly_rate: 75.0,
        specializations: ["Corporate Events", "Professional Headshots", "Event Photography"],
    },
    Member {
        name: "D.gamage",
        title: "Senior Photographer",
        email: "gamage@globalimage.com",
        phone: "+94 11 234 5679",
        description: "Specializes in concert photography and dynamic event coverage.",
        hourly_rate: 65.0,
        specializations: ["Concert Photography", "Dynamic Events", "Live Performance"],
    },
    Member {
        name: "R.liyange",
        title: "Senior Photographer",
        email: "liyange@globalimage.com",
        phone: "+94 11 234 5680",
        description: "Expert in graduation ceremonies and large group event coverage.",
        hourly_rate: 65.0,
        specializations: ["Graduation Ceremonies", "Large Group Events", "Academic Events"],
    },
    Member {
        name: "S.Dilki",
        title: "Photographer & Editor",
        email: "dilki@globalimage.com",
        phone: "+94 11 234 5681",
        description: "Specializes in corporate events photography.",
        hourly_rate: 60.0,
        specializations: ["Corporate Events", "Photo Editing", "Post-Production"],
    },
    Member {
        name: "A.Perera",
        title: "Photographer",
        email: "perera@globalimage.com",
        phone: "+94 11 234 5682",
        description: "Experienced in wedding and family event photography.",
        hourly_rate: 55.0,
        specializations: ["Wedding Photography", "Family Events", "Portrait Photography"],
    },
    Member {
        name: "K.Silva",
        title: "Editor",
        email: "silva@globalimage.com",
        phone: "+94 11 234 5683",
        description: "Expert in post-production and photo editing.",
        hourly_rate: 50.0,
        specializations: ["Photo Editing", "Post-Production", "Color Correction"],
    },
    Member {
        name: "N.Jayasinghe",
        title: "Assistant Photographer",
        email: "jayasinghe@globalimage.com",
        phone: "+94 11 234 5684",
        description: "Supports event shoots and equipment setup.",
        hourly_rate: 40.0,
        specializations: ["Equipment Setup", "Event Support", "Assistant Photography"],
    },
    Member {
        name: "T.Fernando",
        title: "Photographer",
        email: "fernando@globalimage.com",
        phone: "+94 11 234 5685",
        description: "Specializes in outdoor and nature photography.",
        hourly_rate: 55.0,
        specializations: ["Outdoor Photography", "Nature Photography", "Landscape Photography"],
    },
];

impl Member {
    fn to_staff(&self) -> Staff {
        let now = Utc::now();
        Staff {
            id: new_id(),
            name: self.name.to_string(),
            title: self.title.to_string(),
            email: self.email.to_string(),
            phone: Some(self.phone.to_string()),
            photo: Some("/GI_logo.png".to_string()),
            description: Some(self.description.to_string()),
            availability: Availability::default(),
            hourly_rate: self.hourly_rate,
            is_active: true,
            specializations: self.specializations.iter().map(|s| s.to_string()).collect(),
            assigned_bookings: Vec::new(),
            total_events: 0,
            rating: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

fn seed_admin(storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let (Ok(email), Ok(password)) = (std::env::var("ADMIN_EMAIL"), std::env::var("ADMIN_PASSWORD")) else {
        info!("ADMIN_EMAIL/ADMIN_PASSWORD not set, skipping admin account");
        return Ok(());
    };
    let email = email.trim().to_lowercase();
    if storage.find::<User>(|u| u.email == email)?.is_some() {
        info!(%email, "admin account already exists");
        return Ok(());
    }

    let admin = User {
        id: new_id(),
        first_name: "Studio".to_string(),
        last_name: "Admin".to_string(),
        email,
        password_hash: hash_password(&password)?,
        phone: None,
        role: Role::Admin,
        is_active: true,
        created_at: Utc::now(),
        last_login: None,
        profile: Profile::default(),
    };
    storage.save(&admin)?;
    info!(email = %admin.email, "admin account created");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    config.log_sources();
    let storage = Storage::open(&config.data_dir)?;

    let mut inserted = 0;
    for member in TEAM {
        if storage.find::<Staff>(|s| s.email == member.email)?.is_some() {
            warn!(email = member.email, "staff member already exists, skipping");
            continue;
        }
        let staff = member.to_staff();
        storage.save(&staff)?;
        info!(name = %staff.name, title = %staff.title, email = %staff.email, "seeded staff member");
        inserted += 1;
    }
    info!(inserted, total = TEAM.len(), "team roster seeded");

    seed_admin(&storage)?;

    storage.flush().await?;
    info!("seed complete");
    Ok(())
}
