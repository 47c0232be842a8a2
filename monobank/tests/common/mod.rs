//! Local stand-ins for the bank and Telegram HTTP APIs.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mono_bridge::{
    client::{BankClient, ClientOptions},
    gateway::Gateway,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

pub async fn spawn(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    Url::parse(&format!("http://{addr}")).unwrap()
}

pub fn account_for(token: &str) -> String {
    format!("acc-{token}")
}

pub fn statement_item(n: i64) -> Value {
    json!({
        "id": format!("item-{n}"),
        "time": 1_790_000_000 + n,
        "description": format!("Purchase {n}"),
        "mcc": 5411,
        "originalMcc": 5411,
        "amount": -100 * n,
        "operationAmount": -100 * n,
        "currencyCode": 980,
        "commissionRate": 0,
        "cashbackAmount": n,
        "balance": 100_000 - 100 * n,
        "hold": false
    })
}

#[derive(Clone, Default)]
pub struct Bank {
    pub info_calls: Arc<AtomicUsize>,
    pub statement_calls: Arc<AtomicUsize>,
    pub currency_calls: Arc<AtomicUsize>,
    pub fail_info: Arc<AtomicBool>,
    pub garbage_currency: Arc<AtomicBool>,
    pub statement_size: Arc<AtomicUsize>,
    pub paths: Arc<Mutex<Vec<String>>>,
    pub webhooks: Arc<Mutex<Vec<String>>>,
}

impl Bank {
    pub async fn start() -> (Self, Url) {
        let bank = Self::default();
        bank.statement_size.store(7, Ordering::SeqCst);
        let app = Router::new()
            .route("/personal/client-info", get(client_info))
            .route("/personal/statement/:account/:from", get(statement))
            .route("/personal/statement/:account/:from/:to", get(statement))
            .route("/personal/webhook", post(set_webhook))
            .route("/bank/currency", get(currency))
            .with_state(bank.clone());
        let url = spawn(app).await;
        (bank, url)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

pub fn client(url: &Url, token: &str, options: &ClientOptions) -> BankClient {
    let gateway = Gateway::new(url.clone(), std::time::Duration::from_secs(5)).unwrap();
    BankClient::new(SecretString::new(token.to_owned()), gateway, options)
}

fn token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

async fn client_info(State(bank): State<Bank>, headers: HeaderMap) -> Response {
    bank.info_calls.fetch_add(1, Ordering::SeqCst);
    let Some(token) = token(&headers) else {
        return (StatusCode::FORBIDDEN, Json(json!({"errorDescription": "Unknown 'X-Token'"})))
            .into_response();
    };
    if bank.fail_info.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"errorDescription": "boom"})))
            .into_response();
    }

    let webhook = bank.webhooks.lock().unwrap().last().cloned();
    Json(json!({
        "clientId": format!("id-{token}"),
        "name": format!("Client {token}"),
        "webHookUrl": webhook,
        "accounts": [{
            "id": account_for(&token),
            "type": "black",
            "currencyCode": 980,
            "cashbackType": "UAH",
            "balance": 1_000_000,
            "creditLimit": 0,
            "maskedPan": ["537541******1234"],
            "iban": "UA000000000000000000000000000"
        }]
    }))
    .into_response()
}

async fn statement(State(bank): State<Bank>, uri: Uri) -> Response {
    bank.statement_calls.fetch_add(1, Ordering::SeqCst);
    bank.paths.lock().unwrap().push(uri.path().to_owned());

    let size = bank.statement_size.load(Ordering::SeqCst) as i64;
    let items = (1..=size).map(statement_item).collect::<Vec<_>>();
    Json(items).into_response()
}

async fn set_webhook(State(bank): State<Bank>, Json(body): Json<Value>) -> Response {
    let url = body["webHookUrl"].as_str().unwrap_or_default().to_owned();
    bank.webhooks.lock().unwrap().push(url);
    Json(json!({"status": "ok"})).into_response()
}

async fn currency(State(bank): State<Bank>) -> Response {
    bank.currency_calls.fetch_add(1, Ordering::SeqCst);
    if bank.garbage_currency.load(Ordering::SeqCst) {
        return "<html>maintenance</html>".into_response();
    }
    Json(json!([
        {"currencyCodeA": 840, "currencyCodeB": 980, "date": 1_790_000_000, "rateBuy": 41.2, "rateSell": 41.5}
    ]))
    .into_response()
}

/// Records every Bot API call as `(method, body)`.
#[derive(Clone, Default)]
pub struct Telegram {
    pub calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Telegram {
    pub async fn start() -> (Self, Url) {
        let telegram = Self::default();
        let app = Router::new()
            .route("/:bot/:method", post(bot_api))
            .with_state(telegram.clone());
        let url = spawn(app).await;
        (telegram, url)
    }

    fn same_as_last_edit(&self, body: &Value) -> bool {
        let calls = self.calls.lock().unwrap();
        let last = calls.iter().rev().find(|(m, previous)| {
            m == "editMessageText"
                && previous["chat_id"] == body["chat_id"]
                && previous["message_id"] == body["message_id"]
        });
        last.is_some_and(|(_, previous)| {
            previous["text"] == body["text"] && previous["reply_markup"] == body["reply_markup"]
        })
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

async fn bot_api(
    State(telegram): State<Telegram>,
    Path((_bot, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let repeated_edit = method == "editMessageText" && telegram.same_as_last_edit(&body);
    telegram
        .calls
        .lock()
        .unwrap()
        .push((method.clone(), body.clone()));

    // the real Bot API refuses an edit that changes nothing
    if repeated_edit {
        let error = json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is not modified"
        });
        return (StatusCode::BAD_REQUEST, Json(error)).into_response();
    }

    let result = match method.as_str() {
        "getMe" => json!({"id": 1, "is_bot": true, "first_name": "bot", "username": "mono_bot"}),
        "sendMessage" => json!({
            "message_id": 100,
            "chat": {"id": body["chat_id"], "type": "private"},
            "text": body["text"]
        }),
        "getUpdates" => json!([]),
        _ => json!(true),
    };
    Json(json!({"ok": true, "result": result})).into_response()
}
