use url::Url;

use crate::error::ConfigError;
use crate::models::Credentials;

/// 拼出带账号的门户地址：`https://用户:密码@host/path`
pub fn portal_url(host: &str, path: &str, credentials: &Credentials) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        name: "portal_host".to_string(),
        reason,
    };

    let mut url = Url::parse(&format!("https://{}{}", host, path)).map_err(|e| invalid(e.to_string()))?;
    url.set_username(&credentials.username)
        .map_err(|_| invalid(format!("{} 不能携带账号", host)))?;
    url.set_password(Some(&credentials.password))
        .map_err(|_| invalid(format!("{} 不能携带密码", host)))?;
    Ok(url.to_string())
}

/// 用于日志的地址，去掉密码
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => raw.to_string(),
    }
}
