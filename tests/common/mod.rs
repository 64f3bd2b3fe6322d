use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::{
    api_v1_routes,
    auth::{AuthConfig, AuthService},
    config::{AppConfig, PaymentConfig},
    db,
    entities::{product, user},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{ChargeStatus, ChargeVerification, CreateIntentRequest, PaymentGateway, PaymentIntent},
    handlers::AppServices,
    services::LogNotifier,
    AppState,
};

pub const TEST_GATEWAY_SECRET: &str = "sk_test_webhook_secret";
const TEST_JWT_SECRET: &str = "test_jwt_secret_that_is_at_least_32_chars";

/// Programmable gateway double. Intents are issued with sequential
/// references; verification outcome and failure injection are settable
/// per test.
pub struct MockGateway {
    intent_counter: AtomicUsize,
    fail_next_intent: AtomicBool,
    verify_status: Mutex<ChargeStatus>,
    verify_calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            intent_counter: AtomicUsize::new(0),
            fail_next_intent: AtomicBool::new(false),
            verify_status: Mutex::new(ChargeStatus::Success),
            verify_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next create_intent call fail with a gateway error.
    pub fn fail_next_intent(&self) {
        self.fail_next_intent.store(true, Ordering::SeqCst);
    }

    /// Set the status reported by subsequent verify calls.
    pub fn set_verify_status(&self, status: ChargeStatus) {
        *self.verify_status.lock().unwrap() = status;
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(
        &self,
        _request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        if self.fail_next_intent.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::GatewayError(
                "simulated gateway outage".to_string(),
            ));
        }

        let n = self.intent_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentIntent {
            reference: format!("ref_test_{n}"),
            authorization_url: format!("https://checkout.test/pay/{n}"),
            access_code: format!("code_{n}"),
        })
    }

    async fn verify(&self, _reference: &str) -> Result<ChargeVerification, ServiceError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let status = *self.verify_status.lock().unwrap();

        Ok(ChargeVerification {
            status,
            transaction_id: Some("990011".to_string()),
            paid_at: Some(Utc::now()),
            channel: Some("card".to_string()),
            currency: Some("NGN".to_string()),
            ip_address: Some("127.0.0.1".to_string()),
        })
    }
}

/// Test harness backed by a file-based SQLite database with the embedded
/// migrations applied. The event channel receiver is kept open so tests can
/// assert on published events.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub gateway: Arc<MockGateway>,
    pub events: mpsc::Receiver<Event>,
    db_file: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_file = format!("storefront_test_{}.db", Uuid::new_v4().simple());
        let _ = std::fs::remove_file(&db_file);

        let cfg = AppConfig::new(
            format!("sqlite://{db_file}?mode=rwc"),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
            PaymentConfig {
                secret_key: TEST_GATEWAY_SECRET.to_string(),
                base_url: "https://gateway.test".to_string(),
                callback_url: "https://shop.test/payment/callback".to_string(),
                currency: "NGN".to_string(),
                request_timeout_secs: 5,
            },
        );

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);

        let auth = Arc::new(AuthService::new(
            AuthConfig {
                jwt_secret: cfg.jwt_secret.clone(),
                jwt_issuer: "storefront-auth".to_string(),
                jwt_audience: "storefront-api".to_string(),
                access_token_expiration: std::time::Duration::from_secs(cfg.jwt_expiration),
            },
            db_arc.clone(),
            Arc::new(event_sender.clone()),
        ));

        let gateway = Arc::new(MockGateway::new());
        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            gateway.clone(),
            Arc::new(LogNotifier),
            &cfg.payment,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            auth,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .with_state(state.clone());

        Self {
            state,
            router,
            gateway,
            events: event_rx,
            db_file,
        }
    }

    /// Insert an account directly; tests exercising checkout do not go
    /// through the register endpoint.
    pub async fn seed_user(&self, email: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        user::ActiveModel {
            id: Set(user_id),
            name: Set("Test Shopper".to_string()),
            email: Set(email.to_string()),
            password_hash: Set("unused-in-tests".to_string()),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed user");

        user_id
    }

    /// Insert a catalog product directly.
    pub async fn seed_product(&self, name: &str, price: Decimal) -> Uuid {
        let product_id = Uuid::new_v4();
        let now = Utc::now();

        product::ActiveModel {
            id: Set(product_id),
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(price),
            image: Set(Some(format!("https://img.test/{name}.png"))),
            stock: Set(100),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product");

        product_id
    }

    /// Drain every event published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let _ = std::fs::remove_file(format!("{}{}", self.db_file, suffix));
        }
    }
}
