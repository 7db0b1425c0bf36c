//! # Render Configuration Module
//!
//! Timeouts, identity and lifecycle limits for a rendering session. Uses the
//! same builder pattern as the rest of the crate's configuration types.

use std::time::Duration;

/// Desktop browser identities rotated across renderer launches.
pub const DESKTOP_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Configuration for a rendering session
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Budget for a full page load
    pub page_load_timeout: Duration,

    /// Budget for scripts evaluated in the page
    pub script_timeout: Duration,

    /// User agents to pick from, one per launch
    pub user_agents: Vec<String>,

    /// URL patterns the renderer should not fetch (images, fonts, styles, media)
    pub blocked_resource_patterns: Vec<String>,

    /// Proactively restart the renderer after this many loads
    pub restart_every: usize,

    /// Launch attempts per restart before giving up
    pub max_restart_attempts: usize,

    /// Pause between failed launch attempts
    pub restart_backoff: Duration,

    /// Hide automation markers such as `navigator.webdriver`
    pub hide_automation: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            page_load_timeout: Duration::from_secs(15),
            script_timeout: Duration::from_secs(10),
            user_agents: DESKTOP_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            blocked_resource_patterns: [
                "*.css", "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico",
                "*.woff", "*.woff2", "*.ttf", "*.otf", "*.mp4", "*.webm", "*.mp3",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            restart_every: 20,
            max_restart_attempts: 3,
            restart_backoff: Duration::from_millis(500),
            hide_automation: true,
        }
    }
}

/// Builder for RenderConfig
#[derive(Debug, Default)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: RenderConfig::default(),
        }
    }

    /// Set the page load timeout
    pub fn page_load_timeout(mut self, timeout: Duration) -> Self {
        self.config.page_load_timeout = timeout;
        self
    }

    /// Set the script timeout
    pub fn script_timeout(mut self, timeout: Duration) -> Self {
        self.config.script_timeout = timeout;
        self
    }

    /// Replace the user agent pool
    pub fn user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.config.user_agents = user_agents;
        self
    }

    /// Replace the blocked resource patterns
    pub fn blocked_resource_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.blocked_resource_patterns = patterns;
        self
    }

    /// Set how many loads trigger a proactive restart
    pub fn restart_every(mut self, pages: usize) -> Self {
        self.config.restart_every = pages;
        self
    }

    /// Set the bound on launch attempts per restart
    pub fn max_restart_attempts(mut self, attempts: usize) -> Self {
        self.config.max_restart_attempts = attempts;
        self
    }

    /// Set the pause between failed launches
    pub fn restart_backoff(mut self, backoff: Duration) -> Self {
        self.config.restart_backoff = backoff;
        self
    }

    /// Set whether automation markers are hidden
    pub fn hide_automation(mut self, hide: bool) -> Self {
        self.config.hide_automation = hide;
        self
    }

    /// Build the configuration
    pub fn build(self) -> RenderConfig {
        self.config
    }
}

impl RenderConfig {
    /// Create a new builder
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder::new()
    }

    /// Pick the user agent for the given launch number
    pub fn user_agent_for(&self, launch: usize) -> &str {
        if self.user_agents.is_empty() {
            DESKTOP_USER_AGENTS[launch % DESKTOP_USER_AGENTS.len()]
        } else {
            &self.user_agents[launch % self.user_agents.len()]
        }
    }
}
