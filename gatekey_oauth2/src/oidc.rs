//! OIDC provider discovery
//!
//! Providers publish their endpoints in a discovery document, usually at
//! `{issuer}/.well-known/openid-configuration`. Only the fields this
//! crate consumes are modeled.

use serde::{Deserialize, Serialize};

/// The subset of an OIDC discovery document used to locate a provider's
/// endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderMetadata {
    /// The provider's issuer identifier
    pub issuer: String,
    /// Where the provider publishes its JSON Web Key Set
    pub jwks_uri: String,
}

/// Fetches a provider's discovery document
///
/// # Errors
///
/// Returns an error if the document cannot be fetched or parsed.
#[cfg(feature = "reqwest")]
pub async fn fetch_provider_metadata(uri: &str) -> Result<ProviderMetadata, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("gatekey_oauth2/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let response = client.get(uri).send().await?;
    response.error_for_status_ref()?;

    let metadata = response.json::<ProviderMetadata>().await?;

    tracing::debug!(
        oidc.issuer = %metadata.issuer,
        oidc.jwks_uri = %metadata.jwks_uri,
        "fetched provider metadata"
    );

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_metadata_fields_are_ignored() {
        let doc = r#"{
            "issuer": "https://idp.example.com/realms/main",
            "jwks_uri": "https://idp.example.com/realms/main/protocol/openid-connect/certs",
            "authorization_endpoint": "https://idp.example.com/realms/main/protocol/openid-connect/auth",
            "response_types_supported": ["code"]
        }"#;

        let metadata: ProviderMetadata = serde_json::from_str(doc).unwrap();
        assert_eq!(metadata.issuer, "https://idp.example.com/realms/main");
        assert!(metadata.jwks_uri.ends_with("/certs"));
    }
}
