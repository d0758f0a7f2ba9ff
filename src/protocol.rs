//! Wire protocol for the herd.
//!
//! Every message is a single newline-terminated UTF-8 line, tokenised on
//! ASCII whitespace and dispatched on the first token:
//!
//! * `IAMAT <client_id> <location> <client_time>` — a client reporting its
//!   own position.
//! * `AT <server> <skew> <client_id> <location> <client_time>` — a position
//!   record relayed between daemons (and echoed back to clients).
//! * `WHATSAT <client_id> <radius_km> <count>` — a nearby-places query
//!   scoped to a client's last known position.
//!
//! Anything else — wrong verb, wrong arity, unparseable numbers, a location
//! that does not match the grammar — is answered with `? <line>\n`, where
//! `<line>` is the offending message with its internal whitespace collapsed
//! to single spaces.
//!
//! The `client_time` and `location` tokens are carried through the system
//! verbatim: they are parsed for comparison and geometry but never
//! reformatted, so the textual form a client sent is the textual form every
//! daemon repeats.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Constants
// ────────────────────────────────────────────────────────────────────────────

/// Largest search radius a `WHATSAT` may request, in kilometres.
pub const MAX_RADIUS_KM: f64 = 50.0;

/// Largest result count a `WHATSAT` may request.
pub const MAX_RESULT_COUNT: i64 = 20;

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

/// A well-formed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `IAMAT` — a client reporting where it is right now.
    Report(PositionReport),
    /// `AT` — a record relayed from another daemon.
    Update(LocationUpdate),
    /// `WHATSAT` — a nearby-places query.
    Query(NearbyQuery),
}

/// Payload of an `IAMAT` line.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub client_id: String,
    /// ISO-6709 short form, e.g. `+34.068930-118.445127`. Kept verbatim.
    pub location: String,
    /// The `client_time` token exactly as received.
    pub time_token: String,
    /// `time_token` parsed for last-writer-wins comparison.
    pub client_time: f64,
}

/// Payload of an `AT` line.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    /// The daemon that first heard this record from the client.
    pub origin_server: String,
    pub skew: String,
    pub client_id: String,
    pub location: String,
    pub time_token: String,
    pub client_time: f64,
    /// The full six-token line, single-spaced, without trailing newline.
    pub line: String,
}

/// Payload of a `WHATSAT` line.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    pub client_id: String,
    pub radius_km: f64,
    pub count: i64,
}

// ────────────────────────────────────────────────────────────────────────────
// Parse errors
// ────────────────────────────────────────────────────────────────────────────

/// Why an inbound line was rejected. Every variant is answered the same way
/// on the wire (`? <line>\n`); the distinction exists for logging.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command verb")]
    UnknownVerb,
    #[error("wrong number of tokens")]
    WrongArgCount,
    #[error("location does not match the position grammar")]
    BadLocation,
    #[error("unparseable numeric token")]
    BadNumber,
    #[error("radius or result count above the allowed limit")]
    LimitExceeded,
}

// ────────────────────────────────────────────────────────────────────────────
// Parsing
// ────────────────────────────────────────────────────────────────────────────

/// Parse a tokenised line into a [`Command`].
///
/// The caller guarantees `tokens` is non-empty (blank lines are skipped
/// before dispatch).
pub fn parse_command(tokens: &[&str]) -> Result<Command, ParseError> {
    match tokens[0] {
        "IAMAT" => parse_report(tokens),
        "AT" => parse_update(tokens),
        "WHATSAT" => parse_query(tokens),
        _ => Err(ParseError::UnknownVerb),
    }
}

fn parse_report(tokens: &[&str]) -> Result<Command, ParseError> {
    if tokens.len() != 4 {
        return Err(ParseError::WrongArgCount);
    }
    if !location_re().is_match(tokens[2]) {
        return Err(ParseError::BadLocation);
    }
    let client_time = parse_finite(tokens[3]).ok_or(ParseError::BadNumber)?;

    Ok(Command::Report(PositionReport {
        client_id: tokens[1].to_string(),
        location: tokens[2].to_string(),
        time_token: tokens[3].to_string(),
        client_time,
    }))
}

fn parse_update(tokens: &[&str]) -> Result<Command, ParseError> {
    if tokens.len() != 6 {
        return Err(ParseError::WrongArgCount);
    }
    let client_time = parse_finite(tokens[5]).ok_or(ParseError::BadNumber)?;

    Ok(Command::Update(LocationUpdate {
        origin_server: tokens[1].to_string(),
        skew: tokens[2].to_string(),
        client_id: tokens[3].to_string(),
        location: tokens[4].to_string(),
        time_token: tokens[5].to_string(),
        client_time,
        line: tokens.join(" "),
    }))
}

fn parse_query(tokens: &[&str]) -> Result<Command, ParseError> {
    if tokens.len() != 4 {
        return Err(ParseError::WrongArgCount);
    }
    let radius_km = parse_finite(tokens[2]).ok_or(ParseError::BadNumber)?;
    let count: i64 = tokens[3].parse().map_err(|_| ParseError::BadNumber)?;
    if radius_km > MAX_RADIUS_KM || count > MAX_RESULT_COUNT {
        return Err(ParseError::LimitExceeded);
    }

    Ok(Command::Query(NearbyQuery {
        client_id: tokens[1].to_string(),
        radius_km,
        count,
    }))
}

/// Parse a float, rejecting `inf`/`NaN` — timestamps and radii must be
/// finite to compare meaningfully.
fn parse_finite(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ────────────────────────────────────────────────────────────────────────────
// Location grammar
// ────────────────────────────────────────────────────────────────────────────

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([+-]\d+\.\d+)([+-]\d+\.\d+)$").expect("location pattern is valid")
    })
}

/// Split an ISO-6709 short-form token into (latitude, longitude) degrees.
/// Returns `None` when the token does not match the grammar.
pub fn parse_location(location: &str) -> Option<(f64, f64)> {
    let caps = location_re().captures(location)?;
    let lat = caps[1].parse().ok()?;
    let lng = caps[2].parse().ok()?;
    Some((lat, lng))
}

// ────────────────────────────────────────────────────────────────────────────
// Formatting
// ────────────────────────────────────────────────────────────────────────────

/// Format a clock skew (receive time minus client time) with the mandatory
/// leading sign and six fractional digits.
pub fn format_skew(seconds: f64) -> String {
    format!("{:+.6}", seconds)
}

/// Build the canonical six-token `AT` line for a freshly received report.
/// No trailing newline; the transport appends one.
pub fn format_record_line(
    server_name: &str,
    skew: &str,
    client_id: &str,
    location: &str,
    time_token: &str,
) -> String {
    format!("AT {server_name} {skew} {client_id} {location} {time_token}")
}

/// The `? <line>\n` reply sent for any rejected message. Internal whitespace
/// of the offending line is collapsed to single spaces.
pub fn error_reply(line: &str) -> String {
    let normalized: Vec<&str> = line.split_ascii_whitespace().collect();
    format!("? {}\n", normalized.join(" "))
}

/// Seconds since the UNIX epoch as a float, for skew computation.
pub fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
