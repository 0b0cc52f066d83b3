//! Azure cloud endpoints

#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub name: &'static str,
    pub resource_manager: String,
    pub authority_host: String,
}

impl Environment {
    pub fn public() -> Self {
        Self {
            name: "public",
            resource_manager: "https://management.azure.com".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
        }
    }

    pub fn us_government() -> Self {
        Self {
            name: "usgovernment",
            resource_manager: "https://management.usgovcloudapi.net".to_string(),
            authority_host: "https://login.microsoftonline.us".to_string(),
        }
    }

    pub fn china() -> Self {
        Self {
            name: "china",
            resource_manager: "https://management.chinacloudapi.cn".to_string(),
            authority_host: "https://login.chinacloudapi.cn".to_string(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "public" | "azurepubliccloud" => Some(Self::public()),
            "usgovernment" | "azureusgovernmentcloud" => Some(Self::us_government()),
            "china" | "azurechinacloud" => Some(Self::china()),
            _ => None,
        }
    }

    /// OAuth2 scope granting access to the management plane
    pub fn token_scope(&self) -> String {
        format!("{}/.default", self.resource_manager.trim_end_matches('/'))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::public()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_names_are_case_insensitive() {
        assert_eq!(Environment::from_name("PUBLIC"), Some(Environment::public()));
        assert_eq!(
            Environment::from_name("AzureUSGovernmentCloud").map(|e| e.name),
            Some("usgovernment")
        );
        assert_eq!(Environment::from_name("china").map(|e| e.name), Some("china"));
        assert_eq!(Environment::from_name("german"), None);
    }

    #[test]
    fn scope_targets_resource_manager() {
        assert_eq!(
            Environment::public().token_scope(),
            "https://management.azure.com/.default"
        );
    }
}
