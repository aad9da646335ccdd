/// Migrating twice must be idempotent.
///
/// DB-backed test, skipped if NDY_DATABASE_URL is not set.
#[tokio::test]
async fn migrate_idempotent_on_clean_db() -> anyhow::Result<()> {
    let url = match std::env::var(ndy_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: NDY_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = ndy_db::connect(&url).await?;
    ndy_db::migrate(&pool).await?;
    ndy_db::migrate(&pool).await?;

    let st = ndy_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_overrides_table);
    Ok(())
}
