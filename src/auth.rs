use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::{debug, info};
use serde::Serialize;
use serde_json::{Map, Value, ser::PrettyFormatter};

use crate::error::{Error, Result};

pub const DEFAULT_AUTH_PATH: &str = "auth.json";
pub const TOKEN_KEY: &str = "developer_token";
/// Where users find their personal developer token
pub const DEVELOPER_TOKEN_URL: &str = "https://feedly.com/v3/auth/dev";

/// Read the developer token from the auth file at `path`.
pub fn load(path: &Path) -> Result<String> {
    let missing = || Error::MissingCredentials {
        path: path.to_path_buf(),
    };

    let contents = fs::read_to_string(path).map_err(|e| {
        debug!("Failed to read {}: {}", path.display(), e);
        missing()
    })?;
    let data: Value = serde_json::from_str(&contents).map_err(|e| {
        debug!("Failed to parse {}: {}", path.display(), e);
        missing()
    })?;

    match data.get(TOKEN_KEY) {
        Some(Value::String(token)) => Ok(token.clone()),
        _ => Err(missing()),
    }
}

/// Store `token` in the auth file, keeping any other keys already there.
pub fn save(path: &Path, token: &str) -> Result<()> {
    let mut data = match fs::read_to_string(path) {
        Ok(contents) => parse_existing(path, &contents)?,
        Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
        Err(e) => return Err(e.into()),
    };

    data.insert(TOKEN_KEY.to_string(), Value::String(token.to_string()));

    fs::write(path, to_pretty_json(&data)?)?;
    info!("Saved credentials to {}", path.display());
    Ok(())
}

fn parse_existing(path: &Path, contents: &str) -> Result<Map<String, Value>> {
    if contents.trim().is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str(contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::InvalidAuthFile {
            path: path.to_path_buf(),
            reason: "expected a JSON object".to_string(),
        }),
        Err(e) => Err(Error::InvalidAuthFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

// 4-space indent, trailing newline
fn to_pretty_json(data: &Map<String, Value>) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut ser)?;
    buf.push(b'\n');
    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
