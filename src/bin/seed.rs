//! Seeds a local database with a member session and a sample registration
//! so the payment endpoints can be exercised by hand.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use clubpay::{
    auth::AuthService,
    domain::{PaymentStatus, Registration},
    repository::{RegistrationRepository, SqliteRegistrationRepository},
};

#[derive(Parser)]
#[command(name = "seed", about = "Seed a clubpay database with test data")]
struct Args {
    #[arg(long, default_value = "sqlite://clubpay.db")]
    database_url: String,

    /// Member to issue the session token for; generated when absent.
    #[arg(long)]
    member_id: Option<Uuid>,

    /// Skip creating the sample registration.
    #[arg(long)]
    session_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&args.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let member_id = args.member_id.unwrap_or_else(Uuid::new_v4);
    let auth = AuthService::new(pool.clone(), 24);
    let token = auth.create_session(member_id).await?;

    println!("member_id: {}", member_id);
    println!("bearer token: {}", token);

    if !args.session_only {
        let now = Utc::now();
        let repo = SqliteRegistrationRepository::new(pool.clone());
        let registration = repo
            .create(Registration {
                id: Uuid::new_v4(),
                club_id: Uuid::new_v4(),
                operation_id: Uuid::new_v4(),
                participant_id: Uuid::new_v4(),
                member_id,
                provider: None,
                provider_payment_id: None,
                internal_payment_id: None,
                payment_status: PaymentStatus::Open,
                paid: false,
                paid_at: None,
                payment_method: None,
                amount_cents: 2500,
                currency: "EUR".to_string(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        println!("registration_id: {}", registration.id);
        println!("club_id: {}", registration.club_id);
        println!("participant_id: {}", registration.participant_id);
    }

    pool.close().await;
    Ok(())
}
