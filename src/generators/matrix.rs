//! Matrix generator: Cartesian product of the nested generators' outputs.
//!
//! Combinations are emitted in row-major order (the first generator varies slowest).
//! Each combined set is the union of one set from every child; when two children emit
//! the same parameter name, the later child's value wins.
//!
//! Combined keys length-prefix each side (`2:c1+2:a2`), so keys that themselves contain
//! `+` or `:` can never combine into the same key.

use crate::generators::{ParamSet, Params};

fn combined_key(left: &str, right: &str) -> String {
    format!("{}:{left}+{}:{right}", left.len(), right.len())
}

pub(super) fn product(outputs: &[Vec<ParamSet>]) -> Vec<ParamSet> {
    let Some((first, rest)) = outputs.split_first() else {
        return Vec::new();
    };

    rest.iter().fold(first.clone(), |combined, next| {
        combined
            .iter()
            .flat_map(|left| {
                next.iter().map(move |right| {
                    let mut params: Params = left.params.clone();
                    params.extend(right.params.clone());
                    ParamSet {
                        key: combined_key(&left.key, &right.key),
                        params,
                    }
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &str, pairs: &[(&str, &str)]) -> ParamSet {
        ParamSet {
            key: key.to_string(),
            params: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_product_is_row_major() {
        let clusters = vec![
            set("c1", &[("cluster", "dev")]),
            set("c2", &[("cluster", "prod")]),
        ];
        let apps = vec![
            set("a1", &[("app", "guestbook")]),
            set("a2", &[("app", "helm-guestbook")]),
        ];

        let combined = product(&[clusters, apps]);
        let pairs: Vec<(&str, &str)> = combined
            .iter()
            .map(|s| (s.params["cluster"].as_str(), s.params["app"].as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("dev", "guestbook"),
                ("dev", "helm-guestbook"),
                ("prod", "guestbook"),
                ("prod", "helm-guestbook"),
            ]
        );
        assert_eq!(combined[1].key, "2:c1+2:a2");
    }

    #[test]
    fn test_last_generator_wins_on_collision() {
        let combined = product(&[
            vec![set("l", &[("name", "left"), ("only_left", "x")])],
            vec![set("r", &[("name", "right")])],
        ]);
        assert_eq!(combined[0].params["name"], "right");
        assert_eq!(combined[0].params["only_left"], "x");
    }

    #[test]
    fn test_empty_child_empties_product() {
        let combined = product(&[vec![set("a", &[("a", "1")])], Vec::new()]);
        assert!(combined.is_empty());
    }

    #[test]
    fn test_keys_stay_distinct_across_nesting() {
        let left_heavy = product(&[vec![set("a+b", &[])], vec![set("c", &[])]]);
        let right_heavy = product(&[vec![set("a", &[])], vec![set("b+c", &[])]]);
        assert_ne!(left_heavy[0].key, right_heavy[0].key);

        // A nested product feeding an outer one
        let inner = product(&[vec![set("a", &[])], vec![set("b", &[])]]);
        let nested = product(&[inner, vec![set("c", &[])]]);
        let flat = product(&[vec![set("a", &[])], vec![set("b+c", &[])]]);
        assert_ne!(nested[0].key, flat[0].key);
    }
}
