use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing_subscriber::EnvFilter;

use ads_insight_client::auth::EnvCredentials;
use ads_insight_client::{AdsGateway, DateRange, FetchRequest, GatewayConfig};

fn init_tracing() {
    // reqwest and hyper still emit `log` records
    let _ = tracing_log::LogTracer::init();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn live_tests_enabled() -> bool {
    std::env::var("ADS_LIVE_TESTS").ok().as_deref() == Some("1")
}

fn live_account() -> Option<String> {
    std::env::var("ADS_LIVE_ACCOUNT_ID").ok()
}

#[tokio::test]
#[ignore]
async fn live_keyword_page_smoke() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv::dotenv();
    if !live_tests_enabled() {
        return Ok(());
    }
    init_tracing();

    let (Some(credentials), Some(account)) = (EnvCredentials::try_from_env(), live_account()) else {
        return Ok(());
    };
    let config = match std::env::var("ADS_GATEWAY_CONFIG") {
        Ok(path) => GatewayConfig::load(path).await?,
        Err(_) => GatewayConfig::default(),
    };
    let gateway = AdsGateway::connect(config, Arc::new(credentials))?;

    let today = OffsetDateTime::now_utc().date();
    let range = DateRange::new(today - Duration::days(7), today - Duration::days(1))?;
    let request = FetchRequest::new(account, range).with_page_size(10);

    let page = gateway.fetch_keywords(&request, None).await?;
    assert!(page.records.len() <= 10);
    if page.has_more {
        assert!(page.next_cursor.is_some());
    }

    Ok(())
}
