#![allow(dead_code)]

use std::collections::HashMap;

use diesel::SelectableHelper;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use freshmarket_service::{
    app_state::AppState,
    auth,
    config::{self, Config},
    db,
    models::{AccountEntity, CreateAccountEntity, CreateProductEntity, ProductEntity},
    schema::{accounts, products},
    types::Role,
};
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-secret";
pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const DELIVERY_FEE: i64 = 1000;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Nothing listens on this address; requests that reach the database fail fast.
const OFFLINE_DATABASE_URL: &str = "postgres://freshmarket@127.0.0.1:1/freshmarket";

pub fn test_config(database_url: &str, fedapay_base_url: &str) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("DATABASE_URL", database_url.to_string()),
        ("JWT_SECRET", JWT_SECRET.to_string()),
        ("FEDAPAY_PRIVATE_KEY", "sk_sandbox_integration".to_string()),
        ("FEDAPAY_BASE_URL", fedapay_base_url.to_string()),
        ("FEDAPAY_WEBHOOK_SECRET", WEBHOOK_SECRET.to_string()),
        ("FEDAPAY_TIMEOUT_SECS", "2".to_string()),
        ("DELIVERY_FEE", DELIVERY_FEE.to_string()),
    ]);
    config::load_from(move |key: &str| vars.get(key).cloned()).unwrap()
}

/// State whose pool never connects. Enough for everything that is decided before a
/// handler touches the database.
pub fn offline_state() -> AppState {
    let config = test_config(OFFLINE_DATABASE_URL, "http://127.0.0.1:1");
    AppState::new(config, db::build_lazy(OFFLINE_DATABASE_URL)).unwrap()
}

/// State backed by `DATABASE_URL`, migrated.
pub async fn db_state(fedapay_base_url: &str) -> AppState {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
    db::run_migrations_blocking(MIGRATIONS, &url).await.unwrap();
    let config = test_config(&url, fedapay_base_url);
    let pool = db::connect(&config.database).await.unwrap();
    AppState::new(config, pool).unwrap()
}

pub fn token(account_id: i32, role: Role) -> String {
    let config = test_config(OFFLINE_DATABASE_URL, "http://127.0.0.1:1");
    auth::issue_token(account_id, role, &config.auth).unwrap()
}

pub async fn create_account(conn: &mut AsyncPgConnection, role: Role) -> AccountEntity {
    let unique = Uuid::new_v4().simple().to_string();
    diesel::insert_into(accounts::table)
        .values(CreateAccountEntity {
            name: format!("{role} {}", &unique[..6]),
            phone: format!("+229{}", &unique[..12]),
            email: format!("{unique}@freshmarket.test"),
            password_hash: auth::hash_password("password123").unwrap(),
            role: role.to_string(),
            city: Some("Cotonou".into()),
            district: Some("Akpakpa".into()),
            product_type: None,
        })
        .returning(AccountEntity::as_returning())
        .get_result(conn)
        .await
        .unwrap()
}

pub async fn create_product(
    conn: &mut AsyncPgConnection,
    supplier_id: i32,
    unit_price: i64,
    quantity: i32,
) -> ProductEntity {
    diesel::insert_into(products::table)
        .values(CreateProductEntity {
            supplier_id,
            name: "Tomate".into(),
            category: "tomate".into(),
            product_type: "vegetable".into(),
            description: Some("Tomates fraîches".into()),
            unit_price,
            unit: "kg".into(),
            quantity,
            available: true,
            city: Some("Cotonou".into()),
            district: None,
        })
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .unwrap()
}

pub async fn stock_of(conn: &mut AsyncPgConnection, product_id: i32) -> i32 {
    use diesel::QueryDsl;

    products::table
        .find(product_id)
        .select(products::quantity)
        .get_result(conn)
        .await
        .unwrap()
}
