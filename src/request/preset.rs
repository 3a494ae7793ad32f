//! Preconfigured requests that look like a browser or like this tool.

use super::Request;
use super::constants::{ACCEPT_LANGUAGE_ZH, BROWSER_RETRY_DELAYS};
use super::header::{accept_html, accept_language, user_agent};
use crate::context::Context;
use crate::user_agent::{ANDROID_EDGE, MAC_EDGE, WINDOWS_EDGE, default_user_agent};

impl Request {
    /// HTML `Accept`, Chinese-first `Accept-Language`, and retries after
    /// 300 ms, 800 ms and 1.5 s.
    #[must_use]
    pub fn browser(ctx: Context) -> Self {
        Self::new(ctx)
            .header_with([accept_html(), accept_language(ACCEPT_LANGUAGE_ZH)])
            .try_at(BROWSER_RETRY_DELAYS)
    }

    /// [`browser`](Self::browser) with a desktop Edge on macOS User-Agent.
    #[must_use]
    pub fn mac_edge(ctx: Context) -> Self {
        Self::browser(ctx).header_with([user_agent(MAC_EDGE)])
    }

    #[must_use]
    pub fn windows_edge(ctx: Context) -> Self {
        Self::browser(ctx).header_with([user_agent(WINDOWS_EDGE)])
    }

    #[must_use]
    pub fn android_edge(ctx: Context) -> Self {
        Self::browser(ctx).header_with([user_agent(ANDROID_EDGE)])
    }

    /// A plain request identifying itself with the crate's default
    /// User-Agent.
    #[must_use]
    pub fn default_preset(ctx: Context) -> Self {
        Self::new(ctx).header_with([user_agent(default_user_agent())])
    }
}
