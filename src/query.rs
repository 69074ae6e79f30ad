use std::cmp::Ordering;

use kube::{Resource, ResourceExt};
use serde::Deserialize;

use crate::api::v1alpha1::ListResult;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    Name,
    #[default]
    CreateTime,
}

/// Query string accepted by every list route:
/// `?name=<substring>&page=<n>&limit=<n>&sortBy=name|createTime&ascending=<bool>`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    pub name: Option<String>,
    pub page: usize,
    pub limit: Option<usize>,
    pub sort_by: SortBy,
    pub ascending: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            name: None,
            page: 1,
            limit: None,
            sort_by: SortBy::CreateTime,
            ascending: false,
        }
    }
}

impl ListQuery {
    fn matches<K: Resource>(&self, obj: &K) -> bool {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => obj.name_any().contains(name),
            _ => true,
        }
    }

    fn compare<K: Resource>(&self, a: &K, b: &K) -> Ordering {
        let ordering = match self.sort_by {
            SortBy::Name => a.name_any().cmp(&b.name_any()),
            SortBy::CreateTime => a
                .creation_timestamp()
                .map(|t| t.0)
                .cmp(&b.creation_timestamp().map(|t| t.0))
                .then_with(|| a.name_any().cmp(&b.name_any())),
        };
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }

    /// Filters, sorts and pages `items`, converting the page into transfer types.
    /// `total_items` counts the filtered items before paging.
    pub fn apply<K, T>(&self, mut items: Vec<K>, convert: impl Fn(&K) -> T) -> ListResult<T>
    where
        K: Resource,
    {
        items.retain(|obj| self.matches(obj));
        items.sort_by(|a, b| self.compare(a, b));
        let total_items = items.len();

        let page = match self.limit {
            Some(limit) if limit > 0 => {
                let start = self.page.saturating_sub(1).saturating_mul(limit);
                items.iter().skip(start).take(limit).map(&convert).collect()
            }
            _ => items.iter().map(&convert).collect(),
        };

        ListResult {
            items: page,
            total_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PolicyTemplate, PolicyTemplateSpec};
    use chrono::{TimeZone, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn template(name: &str, created_secs: i64) -> PolicyTemplate {
        let mut obj = PolicyTemplate::new(name, PolicyTemplateSpec::default());
        obj.metadata.creation_timestamp = Some(Time(Utc.timestamp_opt(created_secs, 0).unwrap()));
        obj
    }

    fn fixtures() -> Vec<PolicyTemplate> {
        vec![
            template("k8s-required-labels", 300),
            template("k8s-allowed-repos", 100),
            template("k8s-block-nodeport", 200),
            template("container-limits", 400),
        ]
    }

    fn names(query: &ListQuery) -> (Vec<String>, usize) {
        let result = query.apply(fixtures(), |obj| obj.name_any());
        (result.items, result.total_items)
    }

    #[test]
    fn test_list_query() {
        struct TestCase {
            name: &'static str,
            query: ListQuery,
            expected: Vec<&'static str>,
            expected_total: usize,
        }

        let test_cases = vec![
            TestCase {
                name: "default is newest first",
                query: ListQuery::default(),
                expected: vec![
                    "container-limits",
                    "k8s-required-labels",
                    "k8s-block-nodeport",
                    "k8s-allowed-repos",
                ],
                expected_total: 4,
            },
            TestCase {
                name: "name ascending",
                query: ListQuery {
                    sort_by: SortBy::Name,
                    ascending: true,
                    ..Default::default()
                },
                expected: vec![
                    "container-limits",
                    "k8s-allowed-repos",
                    "k8s-block-nodeport",
                    "k8s-required-labels",
                ],
                expected_total: 4,
            },
            TestCase {
                name: "name filter",
                query: ListQuery {
                    name: Some("k8s-".to_string()),
                    sort_by: SortBy::Name,
                    ascending: true,
                    ..Default::default()
                },
                expected: vec!["k8s-allowed-repos", "k8s-block-nodeport", "k8s-required-labels"],
                expected_total: 3,
            },
            TestCase {
                name: "second page",
                query: ListQuery {
                    page: 2,
                    limit: Some(3),
                    ..Default::default()
                },
                expected: vec!["k8s-allowed-repos"],
                expected_total: 4,
            },
            TestCase {
                name: "page zero is the first page",
                query: ListQuery {
                    page: 0,
                    limit: Some(2),
                    ..Default::default()
                },
                expected: vec!["container-limits", "k8s-required-labels"],
                expected_total: 4,
            },
            TestCase {
                name: "page past the end",
                query: ListQuery {
                    page: 5,
                    limit: Some(2),
                    ..Default::default()
                },
                expected: vec![],
                expected_total: 4,
            },
            TestCase {
                name: "zero limit returns everything",
                query: ListQuery {
                    limit: Some(0),
                    ascending: true,
                    ..Default::default()
                },
                expected: vec![
                    "k8s-allowed-repos",
                    "k8s-block-nodeport",
                    "k8s-required-labels",
                    "container-limits",
                ],
                expected_total: 4,
            },
        ];

        for tc in test_cases {
            let (items, total) = names(&tc.query);
            assert_eq!(items, tc.expected, "Failed test case: {}", tc.name);
            assert_eq!(total, tc.expected_total, "Failed test case: {}", tc.name);
        }
    }

    #[test]
    fn test_query_string_defaults() {
        let query: ListQuery =
            serde_json::from_value(serde_json::json!({"sortBy": "name", "limit": 10})).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.sort_by, SortBy::Name);
        assert!(!query.ascending);
    }
}
