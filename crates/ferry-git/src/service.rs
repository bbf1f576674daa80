//! Transfer services and the policy deciding which of them a server exposes.

use crate::GitError;
use std::fmt;
use std::str::FromStr;

/// One of the two transfer directions a smart server can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Fetch/clone: objects flow from the server to the client.
    UploadPack,
    /// Push: objects flow from the client to the server.
    ReceivePack,
}

impl Service {
    /// Every service, in declaration order.
    pub const ALL: [Service; 2] = [Service::UploadPack, Service::ReceivePack];

    /// Wire name, as used in `?service=` and in RPC URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// Subcommand passed to the transfer executable.
    pub fn subcommand(&self) -> &'static str {
        match self {
            Self::UploadPack => "upload-pack",
            Self::ReceivePack => "receive-pack",
        }
    }

    /// Content type of an `info/refs` advertisement for this service.
    pub fn advertisement_content_type(&self) -> String {
        format!("application/x-{}-advertisement", self.as_str())
    }

    /// Content type of an RPC response for this service.
    pub fn result_content_type(&self) -> String {
        format!("application/x-{}-result", self.as_str())
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git-upload-pack" => Ok(Self::UploadPack),
            "git-receive-pack" => Ok(Self::ReceivePack),
            other => Err(GitError::UnknownService(other.to_string())),
        }
    }
}

/// Which services the server is willing to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Allow fetch/clone.
    pub upload_pack: bool,
    /// Allow push.
    pub receive_pack: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            upload_pack: true,
            receive_pack: false,
        }
    }
}

impl AccessPolicy {
    /// Creates a policy from the two enable flags.
    pub fn new(upload_pack: bool, receive_pack: bool) -> Self {
        Self {
            upload_pack,
            receive_pack,
        }
    }

    /// Returns true if `service` is enabled.
    pub fn permits_service(&self, service: Service) -> bool {
        match service {
            Service::UploadPack => self.upload_pack,
            Service::ReceivePack => self.receive_pack,
        }
    }

    /// Returns true iff `name` is a known service name and that service is enabled.
    pub fn permits(&self, name: &str) -> bool {
        name.parse::<Service>()
            .is_ok_and(|service| self.permits_service(service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_service_names() {
        assert_eq!(Service::UploadPack.as_str(), "git-upload-pack");
        assert_eq!(Service::ReceivePack.subcommand(), "receive-pack");
        assert_eq!(
            "git-receive-pack".parse::<Service>().unwrap(),
            Service::ReceivePack
        );
        assert!(matches!(
            "upload-pack".parse::<Service>(),
            Err(GitError::UnknownService(_))
        ));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(
            Service::UploadPack.advertisement_content_type(),
            "application/x-git-upload-pack-advertisement"
        );
        assert_eq!(
            Service::ReceivePack.result_content_type(),
            "application/x-git-receive-pack-result"
        );
    }

    #[test]
    fn test_default_policy_is_read_only() {
        let policy = AccessPolicy::default();
        assert!(policy.permits("git-upload-pack"));
        assert!(!policy.permits("git-receive-pack"));
    }

    #[test]
    fn test_unknown_names_denied() {
        let policy = AccessPolicy::new(true, true);
        for name in ["", "git-upload-pack ", "GIT-UPLOAD-PACK", "git-upload-archive", "x"] {
            assert!(!policy.permits(name), "{name:?} should be denied");
        }
    }

    proptest! {
        #[test]
        fn prop_permits_matches_flags(
            upload in any::<bool>(),
            receive in any::<bool>(),
            name in prop_oneof![
                Just("git-upload-pack".to_string()),
                Just("git-receive-pack".to_string()),
                "[a-z-]{0,20}",
            ],
        ) {
            let policy = AccessPolicy::new(upload, receive);
            let expected = match name.as_str() {
                "git-upload-pack" => upload,
                "git-receive-pack" => receive,
                _ => false,
            };
            prop_assert_eq!(policy.permits(&name), expected);
        }
    }
}
