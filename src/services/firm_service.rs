//! Firm registry queries.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::firm::{CreateFirmRequest, Firm, FirmResponse, FirmWallet},
};

/// Register a firm together with its wallets in one database transaction.
///
/// # Errors
///
/// - `InvalidRequest`: validation failed, or the slug or a wallet is
///   already registered
/// - `Database`: any other database error
pub async fn create_firm(pool: &DbPool, request: CreateFirmRequest) -> Result<FirmResponse, AppError> {
    let request = request.validate().map_err(AppError::InvalidRequest)?;

    let mut tx = pool.begin().await?;

    let firm = sqlx::query_as::<_, Firm>(
        r#"
        INSERT INTO firms (slug, name, website)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(&request.slug)
    .bind(&request.name)
    .bind(&request.website)
    .fetch_one(&mut *tx)
    .await
    .map_err(conflict_as_invalid)?;

    let mut wallets = Vec::with_capacity(request.wallets.len());
    for wallet in &request.wallets {
        let row = sqlx::query_as::<_, FirmWallet>(
            r#"
            INSERT INTO firm_wallets (firm_id, chain_id, address)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(firm.id)
        .bind(wallet.chain_id)
        .bind(&wallet.address)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_as_invalid)?;
        wallets.push(row);
    }

    tx.commit().await?;

    tracing::info!("Registered firm {} with {} wallets", firm.slug, wallets.len());
    Ok(FirmResponse::new(firm, wallets))
}

fn conflict_as_invalid(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::InvalidRequest("Firm slug or wallet is already registered".to_string())
        }
        _ => AppError::Database(err),
    }
}

/// Look up an active firm by slug.
pub async fn get_active_firm(pool: &DbPool, slug: &str) -> Result<Firm, AppError> {
    sqlx::query_as::<_, Firm>("SELECT * FROM firms WHERE slug = $1 AND is_active = true")
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::FirmNotFound)
}

/// All active firms, alphabetically by name.
pub async fn list_active_firms(pool: &DbPool) -> Result<Vec<Firm>, sqlx::Error> {
    sqlx::query_as::<_, Firm>("SELECT * FROM firms WHERE is_active = true ORDER BY name")
        .fetch_all(pool)
        .await
}

pub async fn wallets_for_firm(pool: &DbPool, firm_id: Uuid) -> Result<Vec<FirmWallet>, sqlx::Error> {
    sqlx::query_as::<_, FirmWallet>(
        "SELECT * FROM firm_wallets WHERE firm_id = $1 ORDER BY chain_id, address",
    )
    .bind(firm_id)
    .fetch_all(pool)
    .await
}
