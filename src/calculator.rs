//! License Calculation
//!
//! One license covers a desktop install and, where desktops are short, one
//! extra laptop. Laptops beyond that share licenses two to one, rounding up.
//!
//! | computers | laptops | licenses |
//! |-----------|---------|----------|
//! | 3         | 2       | 3        |
//! | 2         | 5       | 4        |
//! | 0         | 1       | 1        |

use crate::models::{InstallRecord, UserLicenses};
use std::collections::HashMap;

/// Licenses one user needs for the given install counts.
pub fn licenses_needed(computers: u64, laptops: u64) -> u64 {
    if laptops <= computers {
        return computers;
    }

    computers + (laptops - computers).div_ceil(2)
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    computers: u64,
    laptops: u64,
}

fn tally_by_user(records: &[InstallRecord]) -> HashMap<i64, Tally> {
    let mut by_user: HashMap<i64, Tally> = HashMap::new();

    for record in records {
        let tally = by_user.entry(record.user_id).or_default();
        if record.is_computer() {
            tally.computers += 1;
        } else if record.is_laptop() {
            tally.laptops += 1;
        }
    }

    by_user
}

/// Total licenses across every user that has at least one install.
pub fn calculate(records: &[InstallRecord]) -> u64 {
    tally_by_user(records)
        .values()
        .map(|t| licenses_needed(t.computers, t.laptops))
        .sum()
}

/// Per-user figures, sorted by user id.
pub fn breakdown(records: &[InstallRecord]) -> Vec<UserLicenses> {
    let mut users: Vec<UserLicenses> = tally_by_user(records)
        .into_iter()
        .map(|(user_id, t)| UserLicenses {
            user_id,
            computers: t.computers,
            laptops: t.laptops,
            licenses: licenses_needed(t.computers, t.laptops),
        })
        .collect();

    users.sort_by_key(|u| u.user_id);
    users
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_points() {
        assert_eq!(licenses_needed(0, 0), 0);
        assert_eq!(licenses_needed(3, 2), 3);
        assert_eq!(licenses_needed(2, 5), 4);
        assert_eq!(licenses_needed(0, 1), 1);
        assert_eq!(licenses_needed(1, 3), 2);
        assert_eq!(licenses_needed(0, 3), 2);
        assert_eq!(licenses_needed(5, 0), 5);
    }

    #[test]
    fn test_odd_excess_rounds_up() {
        // 3 laptops over parity need 2 licenses, not 1.
        assert_eq!(licenses_needed(1, 4), 3);
    }

    #[test]
    fn test_formula_is_monotonic() {
        for c in 0..30u64 {
            for l in 0..30u64 {
                let here = licenses_needed(c, l);
                assert!(licenses_needed(c + 1, l) >= here, "computers {c} laptops {l}");
                assert!(licenses_needed(c, l + 1) >= here, "computers {c} laptops {l}");
            }
        }
    }

    #[test]
    fn test_large_counts_do_not_overflow() {
        assert_eq!(licenses_needed(0, u64::MAX), u64::MAX / 2 + 1);
    }

    #[test]
    fn test_calculate_sums_users() {
        let records = vec![
            InstallRecord::new(1, 1, "computer"),
            InstallRecord::new(2, 1, "laptop"),
            InstallRecord::new(3, 1, "laptop"),
            InstallRecord::new(4, 1, "laptop"),
            InstallRecord::new(5, 2, "laptop"),
        ];
        assert_eq!(calculate(&records), 3);
    }

    #[test]
    fn test_other_types_count_for_nothing() {
        let records = vec![
            InstallRecord::new(1, 1, "server"),
            InstallRecord::new(2, 1, "tablet"),
        ];
        assert_eq!(calculate(&records), 0);

        let users = breakdown(&records);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].licenses, 0);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(calculate(&[]), 0);
        assert!(breakdown(&[]).is_empty());
    }

    #[test]
    fn test_breakdown_is_sorted() {
        let records = vec![
            InstallRecord::new(1, 9, "laptop"),
            InstallRecord::new(2, 3, "computer"),
            InstallRecord::new(3, 3, "laptop"),
        ];
        let users = breakdown(&records);
        assert_eq!(
            users,
            vec![
                UserLicenses { user_id: 3, computers: 1, laptops: 1, licenses: 1 },
                UserLicenses { user_id: 9, computers: 0, laptops: 1, licenses: 1 },
            ]
        );
    }
}
