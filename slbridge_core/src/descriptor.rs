//! Descriptor table for the controller's shared memory objects
//!
//! The controller writes one line per IPC object it created:
//!
//! ```text
//! name kind id key size offset
//! ```
//!
//! `kind` is `3` for a shared memory segment and `0` for a binary semaphore.
//! Names are already qualified with the robot namespace (`robot.smBaseState`).

use crate::error::{BridgeError, BridgeResult};
use std::collections::BTreeMap;
use std::path::Path;

/// Kind code the controller uses for binary semaphores
pub const KIND_SEMAPHORE: i64 = 0;
/// Kind code the controller uses for shared memory segments
pub const KIND_SHARED_MEMORY: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    SharedMemory,
    Semaphore,
}

impl SegmentKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            KIND_SHARED_MEMORY => Some(SegmentKind::SharedMemory),
            KIND_SEMAPHORE => Some(SegmentKind::Semaphore),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::SharedMemory => "shared memory",
            SegmentKind::Semaphore => "semaphore",
        }
    }
}

/// One IPC object as announced by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub kind: SegmentKind,
    /// Id the controller had for the object; informational only
    pub id: i64,
    pub key: i32,
    pub size: usize,
    pub offset: usize,
}

impl SegmentDescriptor {
    /// Number of payload bytes past the header offset
    pub fn payload_len(&self) -> usize {
        self.size - self.offset
    }
}

/// Qualify a logical channel name with the robot namespace
pub fn qualified_name(namespace: &str, channel: &str) -> String {
    format!("{}.{}", namespace, channel)
}

/// Immutable name -> descriptor mapping
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    entries: BTreeMap<String, SegmentDescriptor>,
    source: String,
}

impl DescriptorTable {
    /// Load a descriptor file written by the controller
    pub fn from_file<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!(
                "Failed to read descriptor file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse_from(&contents, &path.display().to_string())
    }

    /// Parse descriptor records from a string
    pub fn parse(contents: &str) -> BridgeResult<Self> {
        Self::parse_from(contents, "<string>")
    }

    fn parse_from(contents: &str, source: &str) -> BridgeResult<Self> {
        let mut entries = BTreeMap::new();

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, descriptor) = parse_record(line).map_err(|msg| {
                BridgeError::config(format!("{}:{}: {}", source, index + 1, msg))
            })?;

            if entries.insert(name.clone(), descriptor).is_some() {
                return Err(BridgeError::config(format!(
                    "{}:{}: duplicate object '{}'",
                    source,
                    index + 1,
                    name
                )));
            }
        }

        if entries.is_empty() {
            return Err(BridgeError::EmptyDescriptorTable(source.to_string()));
        }

        Ok(Self {
            entries,
            source: source.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&SegmentDescriptor> {
        self.entries.get(name)
    }

    /// Iterate descriptors in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SegmentDescriptor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names belonging to `namespace`
    pub fn names_in<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.keys().filter_map(move |name| {
            name.strip_prefix(namespace)
                .filter(|rest| rest.starts_with('.'))
                .map(|_| name.as_str())
        })
    }

    /// Where the table was loaded from
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn parse_record(line: &str) -> Result<(String, SegmentDescriptor), String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(format!("expected 6 fields, found {}", fields.len()));
    }

    let int = |idx: usize, what: &str| -> Result<i64, String> {
        fields[idx]
            .parse::<i64>()
            .map_err(|_| format!("invalid {} '{}'", what, fields[idx]))
    };

    let code = int(1, "kind")?;
    let kind = SegmentKind::from_code(code).ok_or_else(|| format!("unknown kind {}", code))?;
    let id = int(2, "id")?;
    let key = i32::try_from(int(3, "key")?).map_err(|_| format!("key out of range '{}'", fields[3]))?;
    let size = usize::try_from(int(4, "size")?).map_err(|_| format!("negative size '{}'", fields[4]))?;
    let offset =
        usize::try_from(int(5, "offset")?).map_err(|_| format!("negative offset '{}'", fields[5]))?;

    if offset > size {
        return Err(format!("offset {} exceeds size {}", offset, size));
    }

    Ok((
        fields[0].to_string(),
        SegmentDescriptor {
            kind,
            id,
            key,
            size,
            offset,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
        # written by the task servo
        robot.smJointSimState      3 12 4711 184 0
        robot.smJointSimState_sem  0 13 4712 0   0
        robot.smDCommands          3 14 4713 52  8
    ";

    #[test]
    fn test_parse_table() {
        let table = DescriptorTable::parse(SAMPLE).unwrap();
        assert_eq!(table.len(), 3);

        let joint = table.get("robot.smJointSimState").unwrap();
        assert_eq!(joint.kind, SegmentKind::SharedMemory);
        assert_eq!(joint.key, 4711);
        assert_eq!(joint.payload_len(), 184);

        let commands = table.get("robot.smDCommands").unwrap();
        assert_eq!(commands.payload_len(), 44);

        let sem = table.get("robot.smJointSimState_sem").unwrap();
        assert_eq!(sem.kind, SegmentKind::Semaphore);
    }

    #[test]
    fn test_empty_table_is_fatal() {
        let err = DescriptorTable::parse("\n   \n# nothing\n").unwrap_err();
        assert!(matches!(err, BridgeError::EmptyDescriptorTable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = DescriptorTable::parse("robot.smFoo 7 1 2 3 0").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(":1:"), "{}", msg);
        assert!(msg.contains("unknown kind 7"), "{}", msg);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = DescriptorTable::parse("robot.a 3 1 2 16 0\nrobot.b 3 x 2 16 0").unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn test_offset_past_size_rejected() {
        assert!(DescriptorTable::parse("robot.a 3 1 2 16 20").is_err());
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = DescriptorTable::parse("robot.a 3 1 2 16 0\nrobot.a 0 1 3 0 0").unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_names_in_namespace() {
        let table =
            DescriptorTable::parse("robot.a 3 1 2 16 0\nrobot2.b 3 1 3 16 0\nrobotx 0 1 4 0 0")
                .unwrap();
        let names: Vec<&str> = table.names_in("robot").collect();
        assert_eq!(names, vec!["robot.a"]);
        assert_eq!(qualified_name("robot", "a"), "robot.a");
    }
}
