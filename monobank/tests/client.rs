mod common;

use std::{sync::atomic::Ordering, time::Duration};

use mono_bridge::{
    client::{ClientOptions, ColdStartPolicy},
    error::Endpoint,
    gateway::Gateway,
    limiter::LimitsConfig,
    period::Period,
    report::CacheKey,
    router::Clients,
    Error,
};
use secrecy::SecretString;
use tokio::net::TcpListener;

use common::{account_for, client, Bank};

#[tokio::test]
async fn test_info_is_served_from_cache_while_limited() {
    let (bank, url) = Bank::start().await;
    let client = client(&url, "a", &ClientOptions::default());

    let first = client.info().await.unwrap();
    let second = client.info().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.name, "Client a");
    assert_eq!(client.name(), "Client a");
    assert_eq!(bank.info_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_name_before_first_fetch() {
    let (_bank, url) = Bank::start().await;
    let client = client(&url, "a", &ClientOptions::default());

    assert_eq!(client.name(), "NoName");
}

#[tokio::test]
async fn test_cold_start_fails_fast() {
    let (bank, url) = Bank::start().await;
    bank.fail_info.store(true, Ordering::SeqCst);
    let client = client(&url, "a", &ClientOptions::default());

    let err = client.info().await.unwrap_err();
    assert!(
        matches!(err, Error::Upstream { ref description, .. } if description == "boom"),
        "{err:?}"
    );

    bank.fail_info.store(false, Ordering::SeqCst);
    let err = client.info().await.unwrap_err();
    assert!(matches!(
        err,
        Error::RateLimited {
            endpoint: Endpoint::Info
        }
    ));
    assert_eq!(bank.info_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cold_start_waits_when_configured() {
    let (bank, url) = Bank::start().await;
    bank.fail_info.store(true, Ordering::SeqCst);
    let options = ClientOptions {
        limits: LimitsConfig {
            info_secs: 1,
            ..LimitsConfig::default()
        },
        cold_start: ColdStartPolicy::Wait,
        ..ClientOptions::default()
    };
    let client = client(&url, "a", &options);

    assert!(client.info().await.is_err());
    bank.fail_info.store(false, Ordering::SeqCst);

    let info = tokio::time::timeout(Duration::from_secs(5), client.info())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.name, "Client a");
    assert_eq!(bank.info_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_statement_paths() {
    let (bank, url) = Bank::start().await;
    let today = client(&url, "a", &ClientOptions::default());
    let last_month = client(&url, "b", &ClientOptions::default());

    let items = today.statement(Period::Today, "acc-a").await.unwrap();
    assert_eq!(items.len(), 7);
    last_month
        .statement(Period::LastMonth, "acc-b")
        .await
        .unwrap();

    let paths = bank.paths();
    let today_path = paths[0].split('/').collect::<Vec<_>>();
    let month_path = paths[1].split('/').collect::<Vec<_>>();
    assert_eq!(today_path[..4], ["", "personal", "statement", "acc-a"]);
    assert_eq!(today_path.len(), 5, "open-ended range omits `to`: {paths:?}");
    assert_eq!(month_path[..4], ["", "personal", "statement", "acc-b"]);
    assert_eq!(month_path.len(), 6, "{paths:?}");

    let from = month_path[4].parse::<i64>().unwrap();
    let to = month_path[5].parse::<i64>().unwrap();
    assert!(from < to);
}

#[tokio::test]
async fn test_statement_limiter_is_isolated() {
    let (bank, url) = Bank::start().await;
    let a = client(&url, "a", &ClientOptions::default());
    let b = client(&url, "b", &ClientOptions::default());

    a.statement(Period::Today, "acc-a").await.unwrap();
    let err = a.statement(Period::ThisWeek, "acc-a").await.unwrap_err();
    assert!(matches!(
        err,
        Error::RateLimited {
            endpoint: Endpoint::Statement
        }
    ));

    // other endpoints of the same credential and other credentials are unaffected
    a.info().await.unwrap();
    b.statement(Period::Today, "acc-b").await.unwrap();
    assert_eq!(bank.statement_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalid_period_does_not_spend_the_token() {
    let (bank, url) = Bank::start().await;
    let client = client(&url, "a", &ClientOptions::default());

    let err = client
        .statement_by_label("Yesterday", "acc-a")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPeriod(_)));

    client
        .statement_by_label("Last week", "acc-a")
        .await
        .unwrap();
    assert_eq!(bank.statement_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_account_lookup() {
    let (_bank, url) = Bank::start().await;
    let client = client(&url, "a", &ClientOptions::default());

    let account = client.account("acc-a").await.unwrap();
    assert_eq!(account.balance, 1_000_000);

    let err = client.account("acc-z").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_set_webhook_clears_cached_info() {
    let (bank, url) = Bank::start().await;
    let client = client(&url, "a", &ClientOptions::default());
    client.info().await.unwrap();

    let resp = client
        .set_webhook("https://example.com/web_hook")
        .await
        .unwrap();

    assert_eq!(resp.status, "ok");
    assert!(client.cached_info().is_none());
    assert_eq!(
        bank.webhooks.lock().unwrap().as_slice(),
        ["https://example.com/web_hook"]
    );

    let err = client.set_webhook("https://example.com/other").await.unwrap_err();
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn test_currencies_served_stale() {
    let (bank, url) = Bank::start().await;
    let client = client(&url, "a", &ClientOptions::default());

    let first = client.currencies().await.unwrap();
    let second = client.currencies().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0].currency_code_a, 840);
    assert_eq!(bank.currency_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_json_body_is_a_decode_error() {
    let (bank, url) = Bank::start().await;
    bank.garbage_currency.store(true, Ordering::SeqCst);
    let client = client(&url, "a", &ClientOptions::default());

    let err = client.currencies().await.unwrap_err();

    assert!(matches!(err, Error::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{addr}").parse().unwrap();
    let client = client(&url, "a", &ClientOptions::default());

    let err = client.info().await.unwrap_err();

    assert!(matches!(err, Error::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn test_reports_are_per_account() {
    let (_bank, url) = Bank::start().await;
    let client = client(&url, "a", &ClientOptions::default());

    let report = client.report("acc-a");
    assert!(std::sync::Arc::ptr_eq(&report, &client.report("acc-a")));
    assert!(!std::sync::Arc::ptr_eq(&report, &client.report("acc-b")));

    let key = CacheKey::new(Period::Today, 1, 2, client.id());
    let items = client.statement(Period::Today, "acc-a").await.unwrap();
    report.set_cache_data(key.clone(), items);

    assert_eq!(client.reset_report("acc-a"), 1);
    assert!(!report.is_cached(&key));
    assert_eq!(client.reset_report("acc-unknown"), 0);
}

#[tokio::test]
async fn test_router_lookups() {
    let (_bank, url) = Bank::start().await;
    let options = ClientOptions::default();
    let clients = Clients::new([client(&url, "a", &options), client(&url, "b", &options)]).unwrap();

    assert_eq!(clients.len(), 2);
    let b = clients.get(1).unwrap();
    assert_eq!(clients.by_id(b.id()).unwrap().id(), b.id());
    assert!(clients.get(2).is_none());
    assert!(clients.by_id(0).is_none());

    let owner = clients.by_account(&account_for("b")).await.unwrap();
    assert_eq!(owner.id(), b.id());
    let err = clients.by_account("acc-z").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_router_refuses_duplicate_credentials() {
    let gateway = Gateway::new("http://127.0.0.1:1".parse().unwrap(), Duration::from_secs(1)).unwrap();
    let options = ClientOptions::default();
    let make = || {
        mono_bridge::client::BankClient::new(SecretString::new("same".into()), gateway.clone(), &options)
    };

    let err = Clients::new([make(), make()]).unwrap_err();

    assert!(matches!(err, Error::DuplicateClient(_)));
}

#[tokio::test]
async fn test_statement_when_ready_waits_for_the_bucket() {
    let (bank, url) = Bank::start().await;
    let options = ClientOptions {
        limits: LimitsConfig {
            statement_secs: 1,
            ..LimitsConfig::default()
        },
        ..ClientOptions::default()
    };
    let client = client(&url, "a", &options);

    client.statement(Period::Today, "acc-a").await.unwrap();
    assert!(client.statement(Period::Today, "acc-a").await.is_err());
    let items = tokio::time::timeout(
        Duration::from_secs(5),
        client.statement_when_ready(Period::Today, "acc-a"),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(items.len(), 7);
    assert_eq!(bank.statement_calls.load(Ordering::SeqCst), 2);
}
