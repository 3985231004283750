use indexmap::IndexMap;
use url::Url;

use crate::core::error::UsageError;

/// Caller-supplied parameters passed through to the wire after the built-in ones.
pub type AdditionalParameters = IndexMap<String, String>;

/// Rejects additional parameters that shadow a parameter the message type sets itself.
pub fn check_additional_params(
    params: &AdditionalParameters,
    built_in: &[&str],
) -> Result<(), UsageError> {
    match params.keys().find(|k| built_in.contains(&k.as_str())) {
        Some(key) => Err(UsageError::ReservedParameter(key.clone())),
        None => Ok(()),
    }
}

/// Query parameters of `uri`; the first occurrence of a name wins.
pub fn query_parameters(uri: &Url) -> IndexMap<String, String> {
    let mut params = IndexMap::new();
    for (key, value) in uri.query_pairs() {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

/// Every query parameter not in `built_in`, in the order received.
pub fn unreserved_parameters(
    params: &IndexMap<String, String>,
    built_in: &[&str],
) -> AdditionalParameters {
    params
        .iter()
        .filter(|(k, _)| !built_in.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// `application/x-www-form-urlencoded` body for `params`.
pub fn form_url_encode<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// Reads an `application/x-www-form-urlencoded` body back into parameters, in wire order.
pub fn form_url_decode(body: &str) -> Result<AdditionalParameters, serde_urlencoded::de::Error> {
    serde_urlencoded::from_str(body)
}

pub(crate) fn append_parameter(uri: &mut Url, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        uri.query_pairs_mut().append_pair(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys_are_rejected() {
        let mut params = AdditionalParameters::new();
        params.insert("audience".into(), "api".into());
        assert!(check_additional_params(&params, &["scope", "state"]).is_ok());

        params.insert("state".into(), "x".into());
        assert_eq!(
            check_additional_params(&params, &["scope", "state"]),
            Err(UsageError::ReservedParameter("state".into()))
        );
    }

    #[test]
    fn first_query_value_wins() {
        let uri = Url::parse("app://cb?code=a&code=b&x=1").unwrap();
        let params = query_parameters(&uri);
        assert_eq!(params.get("code").map(String::as_str), Some("a"));
        assert_eq!(
            unreserved_parameters(&params, &["code"]).into_iter().collect::<Vec<_>>(),
            vec![("x".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn form_encoding_escapes_values() {
        let mut params = AdditionalParameters::new();
        params.insert("redirect_uri".into(), "https://app/cb".into());
        params.insert("scope".into(), "openid profile".into());
        let body = form_url_encode(&params);
        assert_eq!(body, "redirect_uri=https%3A%2F%2Fapp%2Fcb&scope=openid+profile");
        assert_eq!(form_url_decode(&body).unwrap(), params);
    }
}
