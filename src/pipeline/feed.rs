//! Input feed
//!
//! The input file lists one repository per line, either `url` (a new
//! repository) or `url,id` (replaying an id from an earlier run).

use csv::ReaderBuilder;
use std::path::Path;
use tracing::{error, info};

use crate::error::Result;
use crate::model::ProjectIds;

/// Outcome of reading an input file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub scheduled: u64,
    pub invalid: u64,
}

/// Read `path`, calling `schedule(url, id)` for every valid record.
///
/// The first `skip` records are ignored and at most `limit` are scheduled;
/// invalid records count towards `skip` but not towards `limit`. Malformed
/// or undecodable records are logged with their line number and skipped.
pub fn feed_from(
    path: &Path,
    ids: &ProjectIds,
    skip: u64,
    limit: Option<u64>,
    mut schedule: impl FnMut(String, u64),
) -> Result<FeedStats> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut stats = FeedStats::default();
    let mut seen = 0u64;

    for record in reader.records() {
        seen += 1;
        if seen <= skip {
            continue;
        }
        if limit.is_some_and(|limit| stats.scheduled >= limit) {
            break;
        }
        let record = match record {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                error!("{}, line {}: unreadable record: {}", path.display(), line, err);
                stats.invalid += 1;
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        match (record.len(), record.get(0).map(str::trim)) {
            (1, Some(url)) if !url.is_empty() => {
                schedule(url.to_string(), ids.next_id());
                stats.scheduled += 1;
            }
            (2, Some(url)) if !url.is_empty() => match record[1].trim().parse::<u64>() {
                // the counter must be able to move past an explicit id
                Ok(id) if id < u64::MAX => {
                    schedule(url.to_string(), ids.claim(id));
                    stats.scheduled += 1;
                }
                _ => {
                    error!(
                        "{}, line {}: invalid project id {:?}",
                        path.display(),
                        line,
                        &record[1]
                    );
                    stats.invalid += 1;
                }
            },
            _ => {
                error!(
                    "{}, line {}: expected url or url,id but got {} fields",
                    path.display(),
                    line,
                    record.len()
                );
                stats.invalid += 1;
            }
        }
    }
    info!(
        "Scheduled {} projects from {} ({} invalid lines)",
        stats.scheduled,
        path.display(),
        stats.invalid
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn feed(text: &str, ids: &ProjectIds, skip: u64, limit: Option<u64>) -> (FeedStats, Vec<(String, u64)>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("projects.csv");
        fs::write(&path, text).unwrap();
        let mut scheduled = Vec::new();
        let stats = feed_from(&path, ids, skip, limit, |url, id| scheduled.push((url, id))).unwrap();
        (stats, scheduled)
    }

    #[test]
    fn test_malformed_id_is_skipped() {
        let ids = ProjectIds::new();
        let (stats, scheduled) = feed("octo/a,12\nocto/b,twelve\nocto/c\n", &ids, 0, None);

        assert_eq!(stats, FeedStats { scheduled: 2, invalid: 1 });
        assert_eq!(
            scheduled,
            vec![("octo/a".to_string(), 12), ("octo/c".to_string(), 13)]
        );
    }

    #[test]
    fn test_new_ids_stay_above_replayed_ones() {
        let ids = ProjectIds::starting_at(50);
        let (_, scheduled) = feed("a/a\nb/b,7\nc/c\nd/d,90\ne/e\n", &ids, 0, None);

        let got: Vec<u64> = scheduled.iter().map(|(_, id)| *id).collect();
        assert_eq!(got, vec![50, 7, 51, 90, 91]);
    }

    #[test]
    fn test_skip_and_limit() {
        let ids = ProjectIds::new();
        let (stats, scheduled) = feed("a/a\nb/b\nc/c\nd/d\ne/e\n", &ids, 1, Some(2));

        assert_eq!(stats.scheduled, 2);
        let urls: Vec<&str> = scheduled.iter().map(|(url, _)| url.as_str()).collect();
        assert_eq!(urls, vec!["b/b", "c/c"]);
    }

    #[test]
    fn test_undecodable_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("projects.csv");
        fs::write(&path, b"a/a\nb/\xff\xfe\nc/c\n").unwrap();

        let ids = ProjectIds::new();
        let mut scheduled = Vec::new();
        let stats = feed_from(&path, &ids, 0, None, |url, id| scheduled.push((url, id))).unwrap();

        assert_eq!(stats, FeedStats { scheduled: 2, invalid: 1 });
        assert_eq!(scheduled, vec![("a/a".to_string(), 0), ("c/c".to_string(), 1)]);
    }

    #[test]
    fn test_largest_id_is_rejected() {
        let ids = ProjectIds::new();
        let (stats, scheduled) = feed("a/a,18446744073709551615
b/b
", &ids, 0, None);

        assert_eq!(stats, FeedStats { scheduled: 1, invalid: 1 });
        assert_eq!(scheduled, vec![("b/b".to_string(), 0)]);
    }

    #[test]
    fn test_invalid_lines_do_not_use_up_the_limit() {
        let ids = ProjectIds::new();
        let (stats, scheduled) = feed("a/a,x
b/b
c/c,y
d/d
e/e
", &ids, 0, Some(2));

        assert_eq!(stats, FeedStats { scheduled: 2, invalid: 2 });
        let urls: Vec<&str> = scheduled.iter().map(|(url, _)| url.as_str()).collect();
        assert_eq!(urls, vec!["b/b", "d/d"]);
    }

    #[test]
    fn test_too_many_fields() {
        let ids = ProjectIds::new();
        let (stats, scheduled) = feed("a/a,1,extra\n", &ids, 0, None);

        assert_eq!(stats.invalid, 1);
        assert!(scheduled.is_empty());
    }
}
