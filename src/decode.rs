use reqwest::header::CONTENT_TYPE;

use crate::{Content, PipedreamError, RawResponse};

/// Content of one response plus the cursor for the page after it.
#[derive(Debug)]
pub(crate) struct Page {
    pub content: Content,
    pub next_page: Option<String>,
}

/// Parses a response body according to its content type.
///
/// JSON content types must parse. Text content types are tried as JSON and
/// fall back to raw bytes. Anything else, or an empty body, stays raw.
pub(crate) fn decode_page(response: &RawResponse) -> Result<Page, PipedreamError> {
    let content_type = response
        .header(CONTENT_TYPE.as_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let has_body = !response.body.iter().all(u8::is_ascii_whitespace);

    if has_body && content_type.contains("json") {
        let value = serde_json::from_slice::<serde_json::Value>(&response.body).map_err(|err| {
            PipedreamError::Decode(format!(
                "invalid JSON response: {err}; body: {}",
                response.text()
            ))
        })?;
        return Ok(json_page(value));
    }

    if has_body && content_type.contains("text") {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) {
            return Ok(json_page(value));
        }
    }

    Ok(Page {
        content: Content::Raw(response.body.clone()),
        next_page: None,
    })
}

fn json_page(value: serde_json::Value) -> Page {
    let next_page = value
        .get("next_page")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);
    Page {
        content: Content::Json(value),
        next_page,
    }
}

/// Merges the contents of every fetched page into one.
///
/// Objects merge key by key with array values concatenated in page order and
/// other values taken from the later page; `next_page` always reflects the
/// final page. Arrays concatenate. Any other mix yields the final page.
pub(crate) fn merge_pages(mut pages: Vec<Content>) -> Content {
    if pages.len() <= 1 {
        return pages.pop().unwrap_or(Content::Raw(Vec::new()));
    }

    let all_objects = pages
        .iter()
        .all(|page| matches!(page, Content::Json(serde_json::Value::Object(_))));
    let all_arrays = pages
        .iter()
        .all(|page| matches!(page, Content::Json(serde_json::Value::Array(_))));

    if all_arrays {
        let items = pages
            .into_iter()
            .filter_map(|page| match page {
                Content::Json(serde_json::Value::Array(items)) => Some(items),
                _ => None,
            })
            .flatten()
            .collect();
        return Content::Json(serde_json::Value::Array(items));
    }

    if !all_objects {
        return pages.pop().unwrap_or(Content::Raw(Vec::new()));
    }

    let mut merged = serde_json::Map::new();
    let mut last_next_page = None;
    for page in pages {
        let Content::Json(serde_json::Value::Object(map)) = page else {
            continue;
        };
        last_next_page = map.get("next_page").cloned();
        for (key, value) in map {
            if let (Some(serde_json::Value::Array(existing)), serde_json::Value::Array(items)) =
                (merged.get_mut(&key), &value)
            {
                existing.extend(items.iter().cloned());
                continue;
            }
            merged.insert(key, value);
        }
    }

    match last_next_page {
        Some(next_page) => {
            merged.insert("next_page".to_owned(), next_page);
        }
        None => {
            merged.remove("next_page");
        }
    }
    Content::Json(serde_json::Value::Object(merged))
}
