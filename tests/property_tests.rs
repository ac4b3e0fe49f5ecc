//! Property-Based Tests for dietpi-admin
//!
//! These tests verify:
//! - Archive naming is deterministic and always recognised
//! - Eviction removes exactly the single oldest archive
//! - Docker rotation keeps exactly the newest archives by name
//! - fstab upserts never duplicate a mount point

use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;

use dietpi_admin::backup::prune_oldest;
use dietpi_admin::fstab::{CifsFstabEntry, upsert_entry};
use dietpi_admin::retention::{ArchivePattern, excess_by_name, list_archives};

// =============================================================================
// Archive naming
// =============================================================================

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1970i32..2200, 1u32..=366).prop_filter_map("valid ordinal", |(y, o)| {
        NaiveDate::from_yo_opt(y, o)
    })
}

fn datetime_strategy() -> impl Strategy<Value = NaiveDateTime> {
    (date_strategy(), 0u32..24, 0u32..60, 0u32..60)
        .prop_map(|(d, h, m, s)| d.and_hms_opt(h, m, s).expect("valid time"))
}

proptest! {
    /// Same date, same name, and the name is recognised as an archive
    #[test]
    fn dietpi_name_is_deterministic(date in date_strategy()) {
        let name = ArchivePattern::DIETPI.file_name_for_date(date);
        prop_assert_eq!(&name, &ArchivePattern::DIETPI.file_name_for_date(date));
        prop_assert_eq!(&name, &format!("dietpi-backup-{}.zip", date.format("%Y-%m-%d")));
        prop_assert!(ArchivePattern::DIETPI.matches(&name));
        prop_assert!(!ArchivePattern::DOCKER_CONFIGS.matches(&name));
    }

    /// Docker archive names sort in the same order as their timestamps
    #[test]
    fn docker_names_sort_chronologically(a in datetime_strategy(), b in datetime_strategy()) {
        let name_a = ArchivePattern::DOCKER_CONFIGS.file_name(a);
        let name_b = ArchivePattern::DOCKER_CONFIGS.file_name(b);
        prop_assert!(ArchivePattern::DOCKER_CONFIGS.matches(&name_a));
        prop_assert_eq!(a.cmp(&b), name_a.cmp(&name_b));
    }

    /// Arbitrary file names never match unless they have the exact shape
    #[test]
    fn random_names_do_not_match(name in "[a-z_.-]{0,40}") {
        prop_assert!(!ArchivePattern::DIETPI.matches(&name));
    }
}

// =============================================================================
// Eviction
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// For N > max archives, one prune removes exactly the oldest by mtime
    #[test]
    fn prune_removes_exactly_the_oldest(
        max in 1usize..6,
        extra in 1usize..5,
        order in any::<u64>(),
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let count = max + extra;
        let base = SystemTime::now() - Duration::from_secs(365 * 86_400);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");

        // Distinct mtimes, assigned in an order unrelated to the names
        let mut expected_oldest = None;
        let mut oldest_age = 0;
        for i in 0..count {
            let day = start + chrono::Days::new(i as u64);
            let path = dir.path().join(ArchivePattern::DIETPI.file_name_for_date(day));
            let age = (order.wrapping_add(i as u64 * 7919) % 10_000) * 1_000 + i as u64;
            let file = File::create(&path).expect("create");
            file.set_modified(base - Duration::from_secs(age)).expect("mtime");
            if expected_oldest.is_none() || age > oldest_age {
                oldest_age = age;
                expected_oldest = Some(path);
            }
        }

        let evicted = prune_oldest(dir.path(), max).expect("prune");

        prop_assert_eq!(evicted, expected_oldest);
        let left = list_archives(dir.path(), &ArchivePattern::DIETPI).expect("list");
        prop_assert_eq!(left.len(), count - 1);
    }

    /// Within the limit nothing is removed
    #[test]
    fn prune_within_limit_is_noop(max in 1usize..8, count in 0usize..8) {
        prop_assume!(count <= max);
        let dir = tempfile::tempdir().expect("tempdir");
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        for i in 0..count {
            let day = start + chrono::Days::new(i as u64);
            File::create(dir.path().join(ArchivePattern::DIETPI.file_name_for_date(day)))
                .expect("create");
        }
        prop_assert_eq!(prune_oldest(dir.path(), max).expect("prune"), None);
    }
}

// =============================================================================
// Docker rotation
// =============================================================================

proptest! {
    /// Exactly the newest `keep` names survive
    #[test]
    fn excess_by_name_keeps_newest(
        stamps in prop::collection::btree_set(datetime_strategy(), 0..20),
        keep in 1usize..10,
    ) {
        let names: Vec<PathBuf> = stamps
            .iter()
            .rev()
            .map(|t| PathBuf::from(ArchivePattern::DOCKER_CONFIGS.file_name(*t)))
            .collect();

        let removed = excess_by_name(names.clone(), keep);

        prop_assert_eq!(removed.len(), names.len().saturating_sub(keep));
        let oldest_kept: Vec<PathBuf> = stamps
            .iter()
            .take(removed.len())
            .map(|t| PathBuf::from(ArchivePattern::DOCKER_CONFIGS.file_name(*t)))
            .collect();
        prop_assert_eq!(removed, oldest_kept);
    }
}

// =============================================================================
// fstab
// =============================================================================

proptest! {
    /// Repeated upserts converge to one line for the mount point
    #[test]
    fn fstab_upsert_is_idempotent(
        mount in "/mnt/[a-z]{1,8}( [a-z]{1,4})?",
        runs in 1usize..5,
    ) {
        let entry = CifsFstabEntry {
            share: "//nas.local/backup".to_string(),
            mount_point: PathBuf::from(&mount),
            credentials_path: PathBuf::from("/root/.smbcredentials"),
            uid: 1000,
            gid: 1000,
            smb_version: "3.0".to_string(),
        };
        let mut content = "PARTUUID=abc-02 / ext4 noatime,rw 0 1\n".to_string();
        for _ in 0..runs {
            content = upsert_entry(&content, &entry).0;
        }
        let line = entry.to_line();
        prop_assert_eq!(content.lines().filter(|l| *l == line).count(), 1);
        prop_assert_eq!(content.lines().count(), 2);
    }
}
