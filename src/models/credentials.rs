use std::fmt;

use serde::Deserialize;

/// 门户账号
///
/// 文件格式沿用 `Usuario.json`：`{ "Usuario": "...", "Senha": "..." }`
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(rename = "Usuario", alias = "username")]
    pub username: String,
    #[serde(rename = "Senha", alias = "password")]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// 密码不进日志
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials::new("user", "s3cret");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("user"));
        assert!(!shown.contains("s3cret"));
    }
}
