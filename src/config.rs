//! Server configuration from flags and environment

use crate::command::TimeoutPolicy;
use crate::driver::WebDriverConfig;
use crate::store::ReconcilerConfig;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;
use steprunner_shared::limits;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "steprunner",
    about = "Replays stored browser workflow steps and streams live progress over WebSocket",
    version
)]
pub struct ServerConfig {
    #[arg(long, env = "STEPRUNNER_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    #[arg(
        long = "webdriver-url",
        env = "STEPRUNNER_WEBDRIVER_URL",
        default_value = "http://127.0.0.1:9515",
        help = "Base URL of a chromedriver-compatible WebDriver endpoint"
    )]
    pub webdriver_url: String,

    #[arg(
        long,
        env = "STEPRUNNER_HEADLESS",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Run the browser without a window"
    )]
    pub headless: bool,

    #[arg(
        long,
        env = "STEPRUNNER_DATABASE",
        default_value = "data/steprunner.sqlite",
        help = "SQLite database holding test cases and steps"
    )]
    pub database: PathBuf,

    #[arg(
        long = "screenshot-dir",
        env = "STEPRUNNER_SCREENSHOT_DIR",
        help = "Directory for step screenshots; screenshots are only streamed when unset"
    )]
    pub screenshot_dir: Option<PathBuf>,

    #[arg(long = "element-wait-ms", env = "STEPRUNNER_ELEMENT_WAIT_MS", default_value_t = limits::ELEMENT_WAIT_TIMEOUT_MS)]
    pub element_wait_ms: u64,

    #[arg(long = "page-load-ms", env = "STEPRUNNER_PAGE_LOAD_MS", default_value_t = limits::NAVIGATION_TIMEOUT_MS)]
    pub page_load_ms: u64,

    #[arg(long = "instant-action-ms", env = "STEPRUNNER_INSTANT_ACTION_MS", default_value_t = limits::INSTANT_ACTION_TIMEOUT_MS)]
    pub instant_action_ms: u64,

    #[arg(
        long = "pacing-ms",
        env = "STEPRUNNER_PACING_MS",
        default_value_t = limits::COMMAND_PACING_MS,
        help = "Pause between consecutive commands"
    )]
    pub pacing_ms: u64,

    #[arg(long = "event-buffer", env = "STEPRUNNER_EVENT_BUFFER", default_value_t = limits::EVENT_BUFFER)]
    pub event_buffer: usize,

    #[arg(
        long = "persist-retries",
        env = "STEPRUNNER_PERSIST_RETRIES",
        default_value_t = limits::PERSIST_MAX_RETRIES,
        help = "Retries for a failed result write before it is dropped"
    )]
    pub persist_retries: u32,

    #[arg(
        long = "teardown-grace-ms",
        env = "STEPRUNNER_TEARDOWN_GRACE_MS",
        default_value_t = limits::TEARDOWN_GRACE_MS,
        help = "Bound on driver teardown after a run ends or its channel closes"
    )]
    pub teardown_grace_ms: u64,
}

impl ServerConfig {
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            element_wait: Duration::from_millis(self.element_wait_ms),
            navigation: Duration::from_millis(self.page_load_ms),
            instant_action: Duration::from_millis(self.instant_action_ms),
            acquire: Duration::from_millis(self.page_load_ms),
            pacing: Duration::from_millis(self.pacing_ms),
            teardown_grace: Duration::from_millis(self.teardown_grace_ms),
            ..TimeoutPolicy::default()
        }
    }

    pub fn webdriver(&self) -> WebDriverConfig {
        WebDriverConfig {
            endpoint: self.webdriver_url.trim_end_matches('/').to_string(),
            headless: self.headless,
            page_load_timeout: Duration::from_millis(self.page_load_ms),
            ..WebDriverConfig::default()
        }
    }

    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            max_retries: self.persist_retries,
            screenshot_dir: self.screenshot_dir.clone(),
            ..ReconcilerConfig::default()
        }
    }
}
