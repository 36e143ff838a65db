use colored::*;
use serde::Serialize;
use slbridge_core::{DescriptorTable, SegmentKind};

/// One row of the `channels` listing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChannelRow {
    pub name: String,
    pub kind: &'static str,
    pub key: i32,
    pub size: usize,
    pub offset: usize,
    pub payload: usize,
}

/// Descriptor rows, optionally restricted to one namespace
pub fn list(table: &DescriptorTable, namespace: Option<&str>) -> Vec<ChannelRow> {
    table
        .iter()
        .filter(|(name, _)| match namespace {
            Some(ns) => table.names_in(ns).any(|n| n == *name),
            None => true,
        })
        .map(|(name, d)| ChannelRow {
            name: name.to_string(),
            kind: match d.kind {
                SegmentKind::SharedMemory => "shm",
                SegmentKind::Semaphore => "sem",
            },
            key: d.key,
            size: d.size,
            offset: d.offset,
            payload: match d.kind {
                SegmentKind::SharedMemory => d.payload_len(),
                SegmentKind::Semaphore => 0,
            },
        })
        .collect()
}

pub fn print(rows: &[ChannelRow], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    println!(
        "{:<36} {:<4} {:>10} {:>8} {:>7} {:>8}",
        "NAME".bold(),
        "KIND".bold(),
        "KEY".bold(),
        "SIZE".bold(),
        "OFFSET".bold(),
        "PAYLOAD".bold()
    );
    for row in rows {
        let kind = match row.kind {
            "sem" => row.kind.yellow(),
            _ => row.kind.cyan(),
        };
        println!(
            "{:<36} {:<4} {:>10} {:>8} {:>7} {:>8}",
            row.name, kind, row.key, row.size, row.offset, row.payload
        );
    }
    println!("{} {} objects", "→".cyan(), rows.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_filters_namespace() {
        let table = DescriptorTable::parse(
            "robot.smBaseState 3 1 100 72 8\n\
             robot.smBaseState_sem 0 2 101 0 0\n\
             arm.smDCommands 3 3 200 52 8",
        )
        .unwrap();

        let rows = list(&table, Some("robot"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "robot.smBaseState");
        assert_eq!(rows[0].payload, 64);
        assert_eq!(rows[1].kind, "sem");
        assert_eq!(rows[1].payload, 0);

        assert_eq!(list(&table, None).len(), 3);
    }
}
