//! Redirect parsing and verification

use std::collections::BTreeMap;

use tracing::warn;
use url::Url;

use crate::error::{AppAuthError, ProviderError, Result};
use crate::validation::{matches_redirect_prefix, validate_oauth_state};

/// Parameters carried by a redirect, from the query and the fragment
///
/// Query parameters win over fragment parameters with the same name.
pub(crate) fn redirect_parameters(
    redirect: &str,
    redirect_prefix: &str,
) -> Result<BTreeMap<String, String>> {
    if !matches_redirect_prefix(redirect, redirect_prefix) {
        return Err(AppAuthError::MalformedResponse(
            "redirect does not match the configured redirect URL".to_string(),
        ));
    }

    let url = Url::parse(redirect)
        .map_err(|e| AppAuthError::MalformedResponse(format!("redirect is not a URL: {e}")))?;

    let mut parameters: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()).into_owned() {
            parameters.entry(key).or_insert(value);
        }
    }
    Ok(parameters)
}

/// Check a redirect against the attempt's state and return the code
///
/// A redirect carrying a state that does not match is rejected before its
/// `error` is considered, so a forged redirect cannot surface as a provider
/// denial.
pub(crate) fn verify_authorization_redirect(
    parameters: &BTreeMap<String, String>,
    expected_state: &str,
) -> Result<String> {
    let returned_state = parameters.get("state");
    if let Some(state) = returned_state {
        validate_oauth_state(expected_state, state).inspect_err(|_| {
            warn!("authorization redirect carried an unexpected state");
        })?;
    }

    if let Some(error) = provider_error(parameters) {
        return Err(AppAuthError::Authorization(error));
    }

    if returned_state.is_none() {
        warn!("authorization redirect carried no state");
        return Err(AppAuthError::StateMismatch);
    }

    parameters
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or_else(|| {
            AppAuthError::MalformedResponse("authorization redirect has no code".to_string())
        })
}

/// Check a logout redirect against the state that was sent
pub(crate) fn verify_end_session_redirect(
    parameters: &BTreeMap<String, String>,
    expected_state: &str,
) -> Result<String> {
    if let Some(state) = parameters.get("state") {
        validate_oauth_state(expected_state, state)?;
    }
    if let Some(error) = provider_error(parameters) {
        return Err(AppAuthError::Authorization(error));
    }
    parameters
        .get("state")
        .cloned()
        .ok_or(AppAuthError::StateMismatch)
}

fn provider_error(parameters: &BTreeMap<String, String>) -> Option<ProviderError> {
    parameters.get("error").map(|code| ProviderError {
        code: code.clone(),
        description: parameters.get("error_description").cloned(),
        uri: parameters.get("error_uri").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const PREFIX: &str = "com.example.app:/cb";

    fn params(redirect: &str) -> BTreeMap<String, String> {
        redirect_parameters(redirect, PREFIX).unwrap()
    }

    #[test]
    fn test_query_and_fragment_parameters() {
        let parameters = params("com.example.app:/cb?code=abc&state=s1#state=other&session_state=x");
        assert_eq!(parameters["code"], "abc");
        assert_eq!(parameters["state"], "s1");
        assert_eq!(parameters["session_state"], "x");
    }

    #[test]
    fn test_prefix_must_match() {
        let err = redirect_parameters("https://evil.example/cb?code=abc", PREFIX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);

        let err = redirect_parameters("com.example.app:/cb-evil?code=abc&state=s1", PREFIX)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_successful_redirect() {
        let code = verify_authorization_redirect(&params("com.example.app:/cb?code=abc&state=s1"), "s1")
            .unwrap();
        assert_eq!(code, "abc");
    }

    #[test]
    fn test_state_mismatch_wins_over_error() {
        let err = verify_authorization_redirect(
            &params("com.example.app:/cb?error=access_denied&state=forged"),
            "s1",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateMismatch);
    }

    #[test]
    fn test_provider_error_with_matching_state() {
        let err = verify_authorization_redirect(
            &params("com.example.app:/cb?error=access_denied&error_description=no+thanks&state=s1"),
            "s1",
        )
        .unwrap_err();
        match err {
            AppAuthError::Authorization(error) => {
                assert_eq!(error.code, "access_denied");
                assert_eq!(error.description.as_deref(), Some("no thanks"));
            }
            other => panic!("expected authorization error, got {other:?}"),
        }
    }

    #[test]
    fn test_provider_error_without_state() {
        let err = verify_authorization_redirect(&params("com.example.app:/cb?error=server_error"), "s1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_missing_state_or_code() {
        let err = verify_authorization_redirect(&params("com.example.app:/cb?code=abc"), "s1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateMismatch);

        let err = verify_authorization_redirect(&params("com.example.app:/cb?state=s1"), "s1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_end_session_redirect() {
        let parameters = redirect_parameters("com.example.app:/logout?state=s2", "com.example.app:/logout")
            .unwrap();
        assert_eq!(verify_end_session_redirect(&parameters, "s2").unwrap(), "s2");
        assert!(verify_end_session_redirect(&parameters, "s3").is_err());
    }
}
