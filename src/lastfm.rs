//! Last.fm top-artists client.
//!
//! Only `user.getTopArtists` is needed, and only with an API key: the chart of
//! any public user can be read without a session.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::leaderboard::{ArtistScrobbleRecord, LeaderboardPage};
use crate::rate_limiter::{RateLimiter, Sleeper};
use crate::transport::{HttpClient, Request};

const API_ROOT: &str = "https://ws.audioscrobbler.com/2.0/";

/// Chart period accepted by `user.getTopArtists`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Overall,
    SevenDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    TwelveMonths,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::Overall => "overall",
            Period::SevenDays => "7day",
            Period::OneMonth => "1month",
            Period::ThreeMonths => "3month",
            Period::SixMonths => "6month",
            Period::TwelveMonths => "12month",
        })
    }
}

/// Something that serves users' top-artist charts one page at a time.
pub trait RankingService {
    /// `page` counts from 1. Pages are sorted by playcount, highest first.
    fn get_top_artists(
        &mut self,
        username: &str,
        page: u32,
        page_size: u32,
        period: Period,
    ) -> Result<LeaderboardPage>;
}

// ── API response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiEnvelope {
    Fault { error: i64, message: String },
    Chart { topartists: ApiTopArtists },
}

#[derive(Debug, Deserialize)]
struct ApiTopArtists {
    #[serde(default)]
    artist: Vec<ApiArtist>,
    #[serde(rename = "@attr")]
    attr: Option<ApiAttr>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
    #[serde(deserialize_with = "number_or_string")]
    playcount: u64,
}

#[derive(Debug, Deserialize)]
struct ApiAttr {
    #[serde(rename = "totalPages", deserialize_with = "number_or_string")]
    total_pages: u64,
}

/// Last.fm sends counts as JSON strings.
fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn parse_chart(envelope: ApiEnvelope) -> Result<LeaderboardPage> {
    match envelope {
        ApiEnvelope::Fault { error, message } => Err(Error::Service {
            code: error,
            message,
        }),
        ApiEnvelope::Chart { topartists } => {
            let records = topartists
                .artist
                .into_iter()
                .map(|a| ArtistScrobbleRecord::new(a.name, a.playcount))
                .collect();
            let total_pages = topartists
                .attr
                .map(|a| u32::try_from(a.total_pages).unwrap_or(u32::MAX));
            Ok(LeaderboardPage::new(records, total_pages))
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct LastFmClient {
    http: HttpClient,
    api_key: String,
}

impl LastFmClient {
    pub fn new(api_key: &str, pause_ms: u64, max_retries: u32, sleeper: Arc<dyn Sleeper>) -> Self {
        let limiter = RateLimiter::from_millis("Last.fm", pause_ms, sleeper);
        LastFmClient {
            http: HttpClient::new(limiter, max_retries),
            api_key: api_key.to_string(),
        }
    }
}

impl RankingService for LastFmClient {
    fn get_top_artists(
        &mut self,
        username: &str,
        page: u32,
        page_size: u32,
        period: Period,
    ) -> Result<LeaderboardPage> {
        let request = Request::get(API_ROOT)
            .query("method", "user.gettopartists")
            .query("user", username)
            .query("period", period)
            .query("limit", page_size)
            .query("page", page)
            .query("api_key", &self.api_key)
            .query("format", "json");

        let envelope: ApiEnvelope = self.http.send_json(&request)?;
        parse_chart(envelope)
    }
}
