use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use clubpay::{
    domain::{Channel, PaymentProvider, PaymentStatus, ReconcileOutcome, Registration},
    payments::{fake, Reconciler},
    repository::{
        AuditLogRepository, RegistrationRepository, SqliteAuditLogRepository,
        SqliteRegistrationRepository,
    },
};

struct Fixture {
    pool: SqlitePool,
    registrations: Arc<SqliteRegistrationRepository>,
    audit: Arc<SqliteAuditLogRepository>,
    reconciler: Reconciler,
}

async fn fixture() -> anyhow::Result<Fixture> {
    let pool = SqlitePool::connect(":memory:").await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let registrations = Arc::new(SqliteRegistrationRepository::new(pool.clone()));
    let audit = Arc::new(SqliteAuditLogRepository::new(pool.clone()));
    let reconciler = Reconciler::new(registrations.clone(), audit.clone());

    Ok(Fixture {
        pool,
        registrations,
        audit,
        reconciler,
    })
}

async fn seed_registration(fixture: &Fixture) -> anyhow::Result<Registration> {
    let now = Utc::now();
    let registration = Registration {
        id: Uuid::new_v4(),
        club_id: Uuid::new_v4(),
        operation_id: Uuid::new_v4(),
        participant_id: Uuid::new_v4(),
        member_id: Uuid::new_v4(),
        provider: Some(PaymentProvider::Mollie),
        provider_payment_id: Some(format!("tr_{}", Uuid::new_v4().simple())),
        internal_payment_id: Some(Uuid::new_v4()),
        payment_status: PaymentStatus::Open,
        paid: false,
        paid_at: None,
        payment_method: None,
        amount_cents: 2500,
        currency: "EUR".to_string(),
        created_at: now,
        updated_at: now,
    };
    Ok(fixture.registrations.create(registration).await?)
}

async fn reload(fixture: &Fixture, id: Uuid) -> anyhow::Result<Registration> {
    Ok(fixture
        .registrations
        .find_by_id(id)
        .await?
        .expect("registration exists"))
}

#[tokio::test]
async fn straight_through_success() -> anyhow::Result<()> {
    let f = fixture().await?;
    let registration = seed_registration(&f).await?;
    let paid_at = Utc.with_ymd_and_hms(2024, 3, 20, 13, 30, 0).unwrap();

    let outcome = f
        .reconciler
        .reconcile(
            &registration,
            &fake::snapshot(PaymentStatus::Paid, Some(paid_at)),
            Channel::Webhook,
        )
        .await?;
    assert_eq!(outcome, ReconcileOutcome::Applied(PaymentStatus::Paid));

    let after = reload(&f, registration.id).await?;
    assert!(after.paid);
    assert_eq!(after.payment_status, PaymentStatus::Paid);
    assert_eq!(after.paid_at, Some(paid_at));
    assert_eq!(after.payment_method.as_deref(), Some("testpay"));

    let trail = f.audit.list_for_registration(registration.id).await?;
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].outcome, "applied");
    assert_eq!(trail[0].channel, Channel::Webhook);
    Ok(())
}

#[tokio::test]
async fn duplicate_delivery_applies_once_audits_twice() -> anyhow::Result<()> {
    let f = fixture().await?;
    let registration = seed_registration(&f).await?;
    let paid_at = Utc.with_ymd_and_hms(2024, 3, 20, 13, 30, 0).unwrap();
    let snapshot = fake::snapshot(PaymentStatus::Paid, Some(paid_at));

    let first = f
        .reconciler
        .reconcile(&registration, &snapshot, Channel::Webhook)
        .await?;
    assert_eq!(first, ReconcileOutcome::Applied(PaymentStatus::Paid));

    let refreshed = reload(&f, registration.id).await?;
    let second = f
        .reconciler
        .reconcile(&refreshed, &snapshot, Channel::Webhook)
        .await?;
    assert!(matches!(second, ReconcileOutcome::Skipped { .. }));

    let after = reload(&f, registration.id).await?;
    assert!(after.paid);
    assert_eq!(after.paid_at, Some(paid_at));

    let trail = f.audit.list_for_registration(registration.id).await?;
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].outcome, "applied");
    assert_eq!(trail[1].outcome, "skipped");
    Ok(())
}

#[tokio::test]
async fn paid_is_a_sink_for_stale_failure() -> anyhow::Result<()> {
    let f = fixture().await?;
    let registration = seed_registration(&f).await?;
    let paid_at = Utc.with_ymd_and_hms(2024, 3, 20, 13, 30, 0).unwrap();

    f.reconciler
        .reconcile(
            &registration,
            &fake::snapshot(PaymentStatus::Paid, Some(paid_at)),
            Channel::Webhook,
        )
        .await?;

    // A failure notification arriving after the payment cleared.
    let refreshed = reload(&f, registration.id).await?;
    let outcome = f
        .reconciler
        .reconcile(
            &refreshed,
            &fake::snapshot(PaymentStatus::Failed, None),
            Channel::Webhook,
        )
        .await?;
    assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));

    let after = reload(&f, registration.id).await?;
    assert!(after.paid);
    assert_eq!(after.payment_status, PaymentStatus::Paid);
    assert_eq!(after.paid_at, Some(paid_at));

    // The discarded event still left a forensic trail.
    let trail = f.audit.list_for_registration(registration.id).await?;
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[1].outcome, "skipped");
    assert_eq!(trail[1].observed_status, Some(PaymentStatus::Failed));
    Ok(())
}

#[tokio::test]
async fn amount_mismatch_is_audited_but_still_applies() -> anyhow::Result<()> {
    let f = fixture().await?;
    let registration = seed_registration(&f).await?;
    let paid_at = Utc.with_ymd_and_hms(2024, 3, 20, 13, 30, 0).unwrap();

    // The provider settled a different amount than the registration captured.
    let mut snapshot = fake::snapshot(PaymentStatus::Paid, Some(paid_at));
    snapshot.amount_cents = Some(9999);

    let outcome = f
        .reconciler
        .reconcile(&registration, &snapshot, Channel::Webhook)
        .await?;
    assert_eq!(outcome, ReconcileOutcome::Applied(PaymentStatus::Paid));

    // The provider is authoritative for settlement; the disagreement lands in
    // the audit trail rather than blocking the transition.
    let after = reload(&f, registration.id).await?;
    assert!(after.paid);
    assert_eq!(after.payment_status, PaymentStatus::Paid);

    let trail = f.audit.list_for_registration(registration.id).await?;
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].outcome, "applied");
    let detail = trail[0].detail.as_deref().expect("detail recorded");
    assert!(detail.contains("amount mismatch"), "detail: {}", detail);
    assert!(detail.contains("2500") && detail.contains("9999"));
    Ok(())
}

#[tokio::test]
async fn pending_and_paid_commute() -> anyhow::Result<()> {
    let f = fixture().await?;
    let paid_at = Utc.with_ymd_and_hms(2024, 3, 20, 13, 30, 0).unwrap();

    // pending then paid
    let first = seed_registration(&f).await?;
    f.reconciler
        .reconcile(
            &first,
            &fake::snapshot(PaymentStatus::Pending, None),
            Channel::Webhook,
        )
        .await?;
    let refreshed = reload(&f, first.id).await?;
    f.reconciler
        .reconcile(
            &refreshed,
            &fake::snapshot(PaymentStatus::Paid, Some(paid_at)),
            Channel::Poll,
        )
        .await?;

    // paid then pending (stale)
    let second = seed_registration(&f).await?;
    f.reconciler
        .reconcile(
            &second,
            &fake::snapshot(PaymentStatus::Paid, Some(paid_at)),
            Channel::Poll,
        )
        .await?;
    let refreshed = reload(&f, second.id).await?;
    let stale = f
        .reconciler
        .reconcile(
            &refreshed,
            &fake::snapshot(PaymentStatus::Pending, None),
            Channel::Webhook,
        )
        .await?;
    assert!(matches!(stale, ReconcileOutcome::Skipped { .. }));

    let a = reload(&f, first.id).await?;
    let b = reload(&f, second.id).await?;
    assert_eq!(a.payment_status, PaymentStatus::Paid);
    assert_eq!(b.payment_status, PaymentStatus::Paid);
    assert!(a.paid && b.paid);
    assert_eq!(a.paid_at, b.paid_at);
    Ok(())
}

#[tokio::test]
async fn failure_transition_clears_paid_at() -> anyhow::Result<()> {
    let f = fixture().await?;
    let registration = seed_registration(&f).await?;

    f.reconciler
        .reconcile(
            &registration,
            &fake::snapshot(PaymentStatus::Pending, None),
            Channel::Webhook,
        )
        .await?;
    let refreshed = reload(&f, registration.id).await?;
    let outcome = f
        .reconciler
        .reconcile(
            &refreshed,
            &fake::snapshot(PaymentStatus::Expired, None),
            Channel::Poll,
        )
        .await?;
    assert_eq!(outcome, ReconcileOutcome::Applied(PaymentStatus::Expired));

    let after = reload(&f, registration.id).await?;
    assert!(!after.paid);
    assert_eq!(after.payment_status, PaymentStatus::Expired);
    assert!(after.paid_at.is_none());
    Ok(())
}

#[tokio::test]
async fn stale_read_loses_race_without_double_apply() -> anyhow::Result<()> {
    let f = fixture().await?;
    let registration = seed_registration(&f).await?;
    let paid_at = Utc.with_ymd_and_hms(2024, 3, 20, 13, 30, 0).unwrap();
    let snapshot = fake::snapshot(PaymentStatus::Paid, Some(paid_at));

    // Two channels that both read the registration while it was still open.
    let first = f
        .reconciler
        .reconcile(&registration, &snapshot, Channel::Webhook)
        .await?;
    let second = f
        .reconciler
        .reconcile(&registration, &snapshot, Channel::Poll)
        .await?;

    assert_eq!(first, ReconcileOutcome::Applied(PaymentStatus::Paid));
    assert!(matches!(second, ReconcileOutcome::Skipped { .. }));

    let after = reload(&f, registration.id).await?;
    assert!(after.paid);
    assert_eq!(after.paid_at, Some(paid_at));
    Ok(())
}

#[tokio::test]
async fn open_snapshot_never_transitions() -> anyhow::Result<()> {
    let f = fixture().await?;
    let registration = seed_registration(&f).await?;

    f.reconciler
        .reconcile(
            &registration,
            &fake::snapshot(PaymentStatus::Pending, None),
            Channel::Webhook,
        )
        .await?;
    let refreshed = reload(&f, registration.id).await?;

    // A stale poll observing the initial status must not move pending back.
    let outcome = f
        .reconciler
        .reconcile(
            &refreshed,
            &fake::snapshot(PaymentStatus::Open, None),
            Channel::Poll,
        )
        .await?;
    assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));

    let after = reload(&f, registration.id).await?;
    assert_eq!(after.payment_status, PaymentStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn channel_independence() -> anyhow::Result<()> {
    let f = fixture().await?;
    let paid_at = Utc.with_ymd_and_hms(2024, 3, 20, 13, 30, 0).unwrap();

    // Webhook only, poll only, and interleaved all settle identically.
    let mut finals = Vec::new();
    for channels in [
        vec![Channel::Webhook],
        vec![Channel::Poll],
        vec![Channel::Webhook, Channel::Poll],
        vec![Channel::Poll, Channel::Webhook],
    ] {
        let registration = seed_registration(&f).await?;
        for channel in channels {
            let current = reload(&f, registration.id).await?;
            f.reconciler
                .reconcile(
                    &current,
                    &fake::snapshot(PaymentStatus::Paid, Some(paid_at)),
                    channel,
                )
                .await?;
        }
        let after = reload(&f, registration.id).await?;
        finals.push((after.paid, after.payment_status, after.paid_at));
    }

    assert!(finals
        .iter()
        .all(|state| *state == (true, PaymentStatus::Paid, Some(paid_at))));
    Ok(())
}

#[tokio::test]
async fn unmatched_webhook_is_recorded() -> anyhow::Result<()> {
    let f = fixture().await?;

    f.reconciler
        .record_unmatched(
            PaymentProvider::Stripe,
            Channel::Webhook,
            "cs_no_such_session",
            Some(serde_json::json!({ "id": "cs_no_such_session" })),
        )
        .await;

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payment_audit_log WHERE registration_id IS NULL AND provider_payment_id = ?",
    )
    .bind("cs_no_such_session")
    .fetch_one(&f.pool)
    .await?;
    assert_eq!(count, 1);
    Ok(())
}
