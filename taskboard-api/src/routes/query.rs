/// Listing query parameters
///
/// `GET /api/tasks` and `GET /api/users` accept:
///
/// - `where`: JSON filter, e.g. `{"completed": false}`
/// - `sort`: JSON object, e.g. `{"deadline": 1}`
/// - `select`: JSON projection, e.g. `{"name": 1}`
/// - `skip`, `limit`: non-negative integers; `limit=0` lifts the limit
/// - `count=true`: return the number of matches instead of the documents
///
/// Every parameter is taken as a raw string and parsed here so that
/// malformed values produce the usual 400 envelope.

use crate::error::{ApiError, ApiResult};
use serde::Deserialize;
use serde_json::Value;
use taskboard_shared::store::query::{Filter, FindQuery, Projection, Sort};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "where")]
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub select: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub count: Option<String>,
}

/// `GET /:id` parameters
#[derive(Debug, Default, Deserialize)]
pub struct GetParams {
    pub select: Option<String>,
}

/// Parsed listing request
#[derive(Debug, Clone, PartialEq)]
pub enum ListRequest {
    Count(Filter),
    Find(FindQuery),
}

fn parse_json(name: &str, raw: &str) -> ApiResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("{} must be valid JSON: {}", name, e)))
}

fn parse_u64(name: &str, raw: &str) -> ApiResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ApiError::BadRequest(format!("{} must be a non-negative integer", name)))
}

/// Parses `select` on its own, for single-document reads
pub fn parse_projection(select: Option<&str>) -> ApiResult<Option<Projection>> {
    let Some(raw) = select else {
        return Ok(None);
    };
    let projection = Projection::parse(&parse_json("select", raw)?)?;
    Ok(Some(projection))
}

impl ListParams {
    /// Builds the store query; `default_limit` applies when `limit` is absent
    pub fn into_request(self, default_limit: Option<u64>) -> ApiResult<ListRequest> {
        let filter = match self.filter.as_deref() {
            Some(raw) => Filter::parse(&parse_json("where", raw)?)?,
            None => Filter::all(),
        };

        let count = match self.count.as_deref() {
            None => false,
            Some(raw) => match raw.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(ApiError::BadRequest("count must be true or false".to_string())),
            },
        };
        if count {
            return Ok(ListRequest::Count(filter));
        }

        let mut query = FindQuery::new(filter);
        if let Some(raw) = self.sort.as_deref() {
            query = query.sort(Sort::parse(&parse_json("sort", raw)?)?);
        }
        if let Some(projection) = parse_projection(self.select.as_deref())? {
            query = query.projection(projection);
        }
        if let Some(raw) = self.skip.as_deref() {
            query = query.skip(parse_u64("skip", raw)?);
        }
        let limit = match self.limit.as_deref() {
            Some(raw) => Some(parse_u64("limit", raw)?),
            None => default_limit,
        };
        // 0 means no limit
        if let Some(limit) = limit.filter(|limit| *limit > 0) {
            query = query.limit(limit);
        }

        Ok(ListRequest::Find(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut params = ListParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "where" => params.filter = value,
                "sort" => params.sort = value,
                "select" => params.select = value,
                "skip" => params.skip = value,
                "limit" => params.limit = value,
                "count" => params.count = value,
                _ => {}
            }
        }
        params
    }

    #[test]
    fn test_defaults_apply_limit() {
        let request = params(&[]).into_request(Some(100)).unwrap();
        match request {
            ListRequest::Find(query) => {
                assert_eq!(query.limit, Some(100));
                assert_eq!(query.skip, 0);
                assert_eq!(query.filter, Filter::all());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_explicit_window_overrides_default() {
        let request = params(&[("skip", "5"), ("limit", "0")])
            .into_request(Some(100))
            .unwrap();
        match request {
            ListRequest::Find(query) => {
                assert_eq!(query.skip, 5);
                assert_eq!(query.limit, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_count_returns_filter_only() {
        let request = params(&[("where", r#"{"completed": true}"#), ("count", "true")])
            .into_request(None)
            .unwrap();
        assert_eq!(
            request,
            ListRequest::Count(Filter::all().eq("completed", json!(true)))
        );
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        assert!(params(&[("where", "{not json")]).into_request(None).is_err());
        assert!(params(&[("sort", "[1]")]).into_request(None).is_err());
        assert!(params(&[("skip", "-1")]).into_request(None).is_err());
        assert!(params(&[("limit", "ten")]).into_request(None).is_err());
        assert!(params(&[("count", "maybe")]).into_request(None).is_err());
        assert!(params(&[("where", r#"{"$where": "1"}"#)]).into_request(None).is_err());
    }

    #[test]
    fn test_projection_is_optional() {
        assert!(parse_projection(None).unwrap().is_none());
        assert!(parse_projection(Some(r#"{"name": 1}"#)).unwrap().is_some());
        assert!(parse_projection(Some("name")).is_err());
    }
}
