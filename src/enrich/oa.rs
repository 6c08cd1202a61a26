//! Open-access lookup response types.
//!
//! Unpaywall-shaped API: one object per DOI with a best location plus a
//! ranked list of alternatives, any of which may carry a direct PDF URL.

use serde::Deserialize;

/// Per-DOI open-access response.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct OaResponse {
    pub best_oa_location: Option<OaLocation>,
    pub oa_locations: Option<Vec<OaLocation>>,
}

/// One open-access location.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct OaLocation {
    pub url_for_pdf: Option<String>,
}

/// Best direct PDF URL: the best location first, then the ranked list.
pub(crate) fn pick_pdf_url(response: &OaResponse) -> Option<String> {
    if let Some(best) = &response.best_oa_location {
        if let Some(url) = &best.url_for_pdf {
            return Some(url.clone());
        }
    }
    response
        .oa_locations
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .find_map(|location| location.url_for_pdf.clone())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_pdf_url_prefers_best_location() {
        let json = serde_json::json!({
            "best_oa_location": { "url_for_pdf": "https://oa.example/best.pdf" },
            "oa_locations": [{ "url_for_pdf": "https://oa.example/other.pdf" }]
        });
        let resp: OaResponse = serde_json::from_value(json).unwrap();
        assert_eq!(
            pick_pdf_url(&resp),
            Some("https://oa.example/best.pdf".to_string())
        );
    }

    #[test]
    fn test_pick_pdf_url_falls_back_to_location_list() {
        let json = serde_json::json!({
            "best_oa_location": { "url_for_pdf": null },
            "oa_locations": [
                { "url_for_pdf": null },
                { "url_for_pdf": "https://oa.example/listed.pdf" }
            ]
        });
        let resp: OaResponse = serde_json::from_value(json).unwrap();
        assert_eq!(
            pick_pdf_url(&resp),
            Some("https://oa.example/listed.pdf".to_string())
        );
    }

    #[test]
    fn test_pick_pdf_url_none_when_closed() {
        let resp: OaResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(pick_pdf_url(&resp), None);
    }
}
