use serde::Deserialize;

/// One page of the sign-ins collection.
///
/// Records are kept as raw JSON values: the server decides which fields to
/// denormalize, and the untouched payload is what gets persisted and
/// exported. Only the paging envelope is decoded here.
#[derive(Debug, Clone, Deserialize)]
pub struct SignInsPage {
    /// Continuation link for the next page, absent on the last page.
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,

    /// The sign-in records on this page, verbatim.
    #[serde(default)]
    pub value: Vec<serde_json::Value>,
}

/// Response body of the OAuth2 client-credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Response of the `/organization` probe used by connection tests.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationResponse {
    #[serde(default)]
    pub value: Vec<Organization>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

/// Outcome of a credential connectivity test.
#[derive(Debug, Clone)]
pub struct ConnectionTest {
    pub success: bool,
    pub tenant_name: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_decodes_next_link_and_records() {
        let json = serde_json::json!({
            "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#auditLogs/signIns",
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/auditLogs/signIns?$skiptoken=abc",
            "value": [{"id": "a"}, {"id": "b"}]
        });
        let page: SignInsPage = serde_json::from_value(json).unwrap();
        assert_eq!(page.value.len(), 2);
        assert!(page.next_link.as_deref().unwrap().contains("skiptoken"));
    }

    #[test]
    fn page_without_next_link_is_last() {
        let page: SignInsPage = serde_json::from_value(serde_json::json!({"value": []})).unwrap();
        assert!(page.next_link.is_none());
        assert!(page.value.is_empty());
    }
}
