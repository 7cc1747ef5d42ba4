//! Read-only records from the batch-scheduler and compute-node collaborators.
//!
//! The engine consumes these when judging node availability; it never mutates
//! them and never builds scheduler command strings itself.

/// A backfill slot the scheduler is willing to fill immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillWindow {
    pub num_nodes: u32,
    pub backfill_time_min: u32,
}

/// One queued batch job as reported by the scheduler's status command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJobStatus {
    pub scheduler_id: u64,
    pub state: String,
    pub queue: String,
    pub num_nodes: u32,
    pub wall_time_min: u32,
    pub time_remaining_min: u32,
}

/// Expand a compressed node-range string like `"1001-1005,1030,1034-1036"`
/// into individual node ids. Malformed ranges are skipped.
pub fn parse_node_list(node_str: &str) -> Vec<u32> {
    let mut node_ids = Vec::new();
    for node_range in node_str.split(',') {
        let node_range = node_range.trim();
        if node_range.is_empty() {
            continue;
        }
        match node_range.split_once('-') {
            Some((lo, hi)) => {
                if let (Ok(lo), Ok(hi)) = (lo.parse::<u32>(), hi.parse::<u32>()) {
                    node_ids.extend(lo..=hi);
                }
            }
            None => {
                if let Ok(id) = node_range.parse::<u32>() {
                    node_ids.push(id);
                }
            }
        }
    }
    node_ids
}

/// Parse an `HH:MM:SS` scheduler clock string into whole minutes, rounding
/// the seconds. Returns 0 on malformed input.
pub fn parse_clock_minutes(t_str: &str) -> u32 {
    let parts: Vec<&str> = t_str.split(':').collect();
    if parts.len() != 3 {
        return 0;
    }
    match (
        parts[0].parse::<u32>(),
        parts[1].parse::<u32>(),
        parts[2].parse::<u32>(),
    ) {
        (Ok(h), Ok(m), Ok(s)) => h * 60 + m + (s + 30) / 60,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_list_ranges_and_singles() {
        assert_eq!(
            parse_node_list("1001-1005,1030,1034-1036"),
            vec![1001, 1002, 1003, 1004, 1005, 1030, 1034, 1035, 1036]
        );
    }

    #[test]
    fn node_list_tolerates_garbage() {
        assert_eq!(parse_node_list(""), Vec::<u32>::new());
        assert_eq!(parse_node_list("12,abc,14-x,15"), vec![12, 15]);
    }

    #[test]
    fn clock_minutes_rounds_seconds() {
        assert_eq!(parse_clock_minutes("01:30:00"), 90);
        assert_eq!(parse_clock_minutes("00:10:31"), 11);
        assert_eq!(parse_clock_minutes("00:10:29"), 10);
    }

    #[test]
    fn clock_minutes_malformed_is_zero() {
        assert_eq!(parse_clock_minutes("90"), 0);
        assert_eq!(parse_clock_minutes("aa:bb:cc"), 0);
    }
}
