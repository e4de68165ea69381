//! W3C WebDriver bridge
//!
//! Talks to a chromedriver-compatible endpoint over HTTP. One
//! [`WebDriverSession`] is one browser; it is deleted on `quit`.

use super::{AutomationDriver, DriverError, DriverFactory, ElementHandle};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use steprunner_shared::{Locator, LocatorStrategy};
use tracing::{debug, info, warn};

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Configuration for the WebDriver endpoint
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Base URL of the WebDriver server (e.g., "http://127.0.0.1:9515")
    pub endpoint: String,
    /// Run the browser without a window
    pub headless: bool,
    /// Page load timeout applied to the session
    pub page_load_timeout: Duration,
    /// HTTP timeout for a single WebDriver call
    pub request_timeout: Duration,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9515".into(),
            headless: true,
            page_load_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Creates Chrome sessions on a WebDriver endpoint
pub struct WebDriverFactory {
    config: WebDriverConfig,
    client: Client,
}

impl WebDriverFactory {
    pub fn new(config: WebDriverConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec![
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-blink-features=AutomationControlled",
            "--window-size=1920,1080",
        ];
        if self.config.headless {
            args.push("--headless=new");
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                    "timeouts": {
                        "pageLoad": self.config.page_load_timeout.as_millis() as u64,
                        "implicit": 0
                    }
                }
            }
        })
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn acquire(&self) -> Result<Box<dyn AutomationDriver>, DriverError> {
        let url = format!("{}/session", self.config.endpoint.trim_end_matches('/'));
        let value = send(&self.client, Method::POST, &url, Some(self.capabilities()))
            .await
            .map_err(|e| match e {
                WireError::Transport(msg) => DriverError::Unavailable(msg),
                WireError::Remote { code, message } => {
                    DriverError::Unavailable(format!("{code}: {message}"))
                }
            })?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("new session response without sessionId".into()))?
            .to_string();

        info!("WebDriver session {} started", session_id);

        Ok(Box::new(WebDriverSession {
            base: format!("{url}/{session_id}"),
            session_id,
            client: self.client.clone(),
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "webdriver"
    }
}

/// One browser session on a WebDriver endpoint
pub struct WebDriverSession {
    session_id: String,
    base: String,
    client: Client,
    closed: bool,
}

impl WebDriverSession {
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, WireError> {
        let url = format!("{}{}", self.base, path);
        debug!("WebDriver {} {}", method, path);
        send(&self.client, method, &url, body).await
    }
}

#[async_trait]
impl AutomationDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.call(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
            .map_err(|e| e.into_driver_error(|_, message| DriverError::Navigation(message)))
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        let (using, value) = w3c_locator(locator);
        let found = self
            .call(
                Method::POST,
                "/element",
                Some(json!({ "using": using, "value": value })),
            )
            .await
            .map_err(|e| {
                e.into_driver_error(|code, message| match code {
                    "no such element" => DriverError::NotFound(locator.to_string()),
                    _ => DriverError::Protocol(message),
                })
            })?;

        found
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("element response without reference".into()))
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.call(Method::POST, &format!("/element/{element}/click"), Some(json!({})))
            .await
            .map(|_| ())
            .map_err(|e| e.into_driver_error(interaction_error))
    }

    async fn clear_and_type(&mut self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.call(Method::POST, &format!("/element/{element}/clear"), Some(json!({})))
            .await
            .map_err(|e| e.into_driver_error(interaction_error))?;
        self.call(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
        .map_err(|e| e.into_driver_error(interaction_error))
    }

    async fn element_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self
            .call(Method::GET, &format!("/element/{element}/text"), None)
            .await
            .map_err(|e| e.into_driver_error(interaction_error))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&mut self) -> Result<Bytes, DriverError> {
        let value = self
            .call(Method::GET, "/screenshot", None)
            .await
            .map_err(|e| e.into_driver_error(|_, message| DriverError::Protocol(message)))?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("screenshot response is not a string".into()))?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(|e| DriverError::Protocol(format!("screenshot is not base64: {e}")))
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self
            .call(Method::DELETE, "", None)
            .await
            .map(|_| ())
            .map_err(|e| e.into_driver_error(|_, message| DriverError::Protocol(message)));
        match &result {
            Ok(()) => info!("WebDriver session {} closed", self.session_id),
            Err(e) => warn!("WebDriver session {} close failed: {}", self.session_id, e),
        }
        result
    }
}

/// Raw failure of one WebDriver HTTP call
#[derive(Debug)]
enum WireError {
    /// Endpoint unreachable or the HTTP exchange itself failed
    Transport(String),
    /// W3C error object returned by the endpoint
    Remote { code: String, message: String },
}

impl WireError {
    /// Map into a driver error; session loss is always infrastructure
    fn into_driver_error(self, classify: impl FnOnce(&str, String) -> DriverError) -> DriverError {
        match self {
            WireError::Transport(msg) => DriverError::Disconnected(msg),
            WireError::Remote { code, message } => match code.as_str() {
                "invalid session id" | "no such window" | "session not created" => {
                    DriverError::Disconnected(format!("{code}: {message}"))
                }
                _ => classify(&code, format!("{code}: {message}")),
            },
        }
    }
}

fn interaction_error(code: &str, message: String) -> DriverError {
    match code {
        "element not interactable"
        | "element click intercepted"
        | "stale element reference"
        | "invalid element state" => DriverError::NotInteractable(message),
        "no such element" => DriverError::NotFound(message),
        _ => DriverError::Protocol(message),
    }
}

async fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value, WireError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| WireError::Transport(e.to_string()))?;
    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| WireError::Transport(format!("unreadable response ({status}): {e}")))?;

    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }

    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    Err(WireError::Remote { code, message })
}

/// Translate a locator into a W3C `using`/`value` pair.
///
/// W3C only knows css, link text, partial link text, tag name and xpath, so
/// id, name and class locators are expressed as CSS.
fn w3c_locator(locator: &Locator) -> (&'static str, String) {
    let value = locator.value.as_str();
    match locator.strategy {
        LocatorStrategy::Css => ("css selector", value.to_string()),
        LocatorStrategy::Xpath => ("xpath", value.to_string()),
        LocatorStrategy::LinkText => ("link text", value.to_string()),
        LocatorStrategy::PartialLinkText => ("partial link text", value.to_string()),
        LocatorStrategy::Tag => ("tag name", value.to_string()),
        LocatorStrategy::Id => ("css selector", format!("[id=\"{}\"]", css_escape(value))),
        LocatorStrategy::Name => ("css selector", format!("[name=\"{}\"]", css_escape(value))),
        LocatorStrategy::Class => (
            "css selector",
            value
                .split_whitespace()
                .map(|class| format!("[class~=\"{}\"]", css_escape(class)))
                .collect::<String>(),
        ),
    }
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
