//! Stream identifiers
//!
//! A `StreamId` is the registry key for one logical stream. The route it
//! carries is fixed by whoever builds it, so the registry never has to parse
//! names to decide which endpoint to dial.

use std::fmt;

/// Endpoint family a stream connects through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// One raw stream per connection (`ws/<name>`)
    Single,
    /// Multiplexed streams wrapped in `{"stream", "data"}` (`stream?<name>`)
    Combined,
}

impl Route {
    /// Path prefix appended to the base endpoint
    #[inline]
    pub fn prefix(&self) -> &'static str {
        match self {
            Route::Single => "ws/",
            Route::Combined => "stream?",
        }
    }
}

/// Opaque, comparable stream key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    name: String,
    route: Route,
}

impl StreamId {
    /// Single-stream identifier from an already formatted name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            route: Route::Single,
        }
    }

    /// Multiplexed identifier; `name` must already be `streams=a/b/...`
    pub fn combined(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            route: Route::Combined,
        }
    }

    /// User-data stream identifier. The listen key is the stream name.
    pub fn listen_key(key: impl Into<String>) -> Self {
        Self::new(key)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn route(&self) -> Route {
        self.route
    }

    /// Full connection URL: base endpoint + route prefix + name
    pub fn url(&self, base_url: &str) -> String {
        let mut url = String::with_capacity(base_url.len() + self.name.len() + 8);
        url.push_str(base_url);
        if !base_url.ends_with('/') {
            url.push('/');
        }
        url.push_str(self.route.prefix());
        url.push_str(&self.name);
        url
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for StreamId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
