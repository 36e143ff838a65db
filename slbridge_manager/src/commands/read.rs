use anyhow::Result;
use serde::Serialize;
use slbridge_core::codec::{bytes_to_floats, TIMESTAMP_BYTES};
use slbridge_core::ShmBridge;

/// Channel payload interpreted as timestamp + float rows
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FloatDump {
    pub timestamp: f32,
    pub rows: Vec<Vec<f32>>,
}

/// Read one channel under its semaphore
///
/// `Ok(None)` when the lock could not be taken.
pub fn read(bridge: &ShmBridge, channel: &str) -> Result<Option<Vec<u8>>> {
    Ok(bridge.read_locked(channel)?)
}

/// Split a payload into timestamp and rows of `cols` floats
///
/// Trailing floats that do not fill a row end up in a shorter last row.
pub fn to_floats(data: &[u8], cols: Option<usize>) -> Result<FloatDump> {
    if data.len() < TIMESTAMP_BYTES {
        anyhow::bail!("Payload of {} bytes has no timestamp", data.len());
    }
    let values = bytes_to_floats(data)?;
    let (timestamp, rest) = (values[0], &values[1..]);

    let cols = cols.filter(|c| *c > 0).unwrap_or(rest.len().max(1));
    Ok(FloatDump {
        timestamp,
        rows: rest.chunks(cols).map(|row| row.to_vec()).collect(),
    })
}

/// Classic 16-bytes-per-line hex dump
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in data.chunks(16).enumerate() {
        let bytes: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        out.push_str(&format!("{:08x}  {}\n", line * 16, bytes.join(" ")));
    }
    out
}

pub fn format_floats(dump: &FloatDump) -> String {
    let mut out = format!("t = {}\n", dump.timestamp);
    for (i, row) in dump.rows.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("{:>12.6}", v)).collect();
        out.push_str(&format!("[{:>3}] {}\n", i, cells.join(" ")));
    }
    out
}
