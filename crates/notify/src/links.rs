//! Absolute deep-links, signed unsubscribe links and signed reply-to
//! addresses.
//!
//! Signatures are HMAC-SHA256 over a fixed message layout, hex encoded.
//! Link generation is deterministic for a given key.

use fanout_core::{Group, GroupId, Organization, Project, UserId};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::traits::NotifyError;

type HmacSha256 = Hmac<Sha256>;

const SYSTEM_AVATAR_PATH: &str = "/_static/sentry/images/sentry-email-avatar.png";
const REPLY_SIGNATURE_LEN: usize = 20;

#[derive(Clone)]
pub struct LinkBuilder {
    base: Url,
    mac: HmacSha256,
    reply_hostname: String,
}

impl std::fmt::Debug for LinkBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkBuilder")
            .field("base", &self.base.as_str())
            .field("reply_hostname", &self.reply_hostname)
            .finish_non_exhaustive()
    }
}

impl LinkBuilder {
    pub fn new(
        url_prefix: &str,
        key: &[u8],
        reply_hostname: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let base = Url::parse(url_prefix)
            .map_err(|e| NotifyError::Config(format!("invalid url prefix '{url_prefix}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(NotifyError::Config(format!(
                "url prefix '{url_prefix}' cannot be a base"
            )));
        }
        if key.is_empty() {
            return Err(NotifyError::Config("signing key must not be empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| NotifyError::Config(format!("invalid signing key: {e}")))?;
        Ok(Self {
            base,
            mac,
            reply_hostname: reply_hostname.into(),
        })
    }

    /// Join a root-relative path (with optional query) onto the URL prefix.
    pub fn absolute_uri(&self, path: &str) -> String {
        let prefix = self.base.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{prefix}{path}")
        } else {
            format!("{prefix}/{path}")
        }
    }

    pub fn project_link(&self, organization: &Organization, project: &Project) -> String {
        self.absolute_uri(&format!("/{}/{}/", organization.slug, project.slug))
    }

    /// Group deep-link, tagged with a referrer for attribution.
    pub fn group_link(&self, organization: &Organization, group: &Group, referrer: &str) -> String {
        let mut url = self.path_url(&["organizations", &organization.slug, "issues", &group.id.to_string()]);
        if !referrer.is_empty() {
            url.query_pairs_mut().append_pair("referrer", referrer);
        }
        url.to_string()
    }

    /// The group's activity feed: the group link's path with `activity/` appended.
    pub fn activity_link(&self, group_link: &str) -> Result<String, NotifyError> {
        let mut url = Url::parse(group_link)
            .map_err(|e| NotifyError::Config(format!("invalid group link '{group_link}': {e}")))?;
        let path = format!("{}/activity/", url.path().trim_end_matches('/'));
        url.set_path(&path);
        Ok(url.to_string())
    }

    pub fn release_link(&self, organization: &Organization, version: &str) -> String {
        self.path_url(&["organizations", &organization.slug, "releases", version])
            .to_string()
    }

    pub fn system_avatar_url(&self) -> String {
        self.absolute_uri(SYSTEM_AVATAR_PATH)
    }

    /// URL of an uploaded avatar. A missing avatar record yields an empty string.
    pub fn user_avatar_url(&self, ident: Option<&str>, size: Option<u32>) -> String {
        let Some(ident) = ident.filter(|i| !i.is_empty()) else {
            return String::new();
        };
        let mut url = self.path_url(&["avatar", ident]);
        if let Some(size) = size {
            url.query_pairs_mut().append_pair("s", &size.to_string());
        }
        url.to_string()
    }

    /// Signed link that unsubscribes `user_id` from `group_id`.
    pub fn unsubscribe_link(&self, user_id: UserId, group_id: GroupId) -> String {
        let path = unsubscribe_path(group_id);
        let signature = self.sign(&format!("{path}:{user_id}"));
        self.absolute_uri(&format!("{path}?_={user_id}:{signature}"))
    }

    /// Verify an unsubscribe link and return the (user, group) it was issued for.
    pub fn verify_unsubscribe_link(&self, link: &str) -> Result<(UserId, GroupId), NotifyError> {
        let url = Url::parse(link).map_err(|e| NotifyError::Signature(e.to_string()))?;
        let group_id: GroupId = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| NotifyError::Signature("missing issue id".to_string()))?;
        let token = url
            .query_pairs()
            .find(|(k, _)| k == "_")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| NotifyError::Signature("missing signature".to_string()))?;
        let (user_id, signature) = token
            .split_once(':')
            .ok_or_else(|| NotifyError::Signature("malformed signature".to_string()))?;
        let user_id: UserId = user_id
            .parse()
            .map_err(|_| NotifyError::Signature("malformed user id".to_string()))?;

        self.verify(
            &format!("{}:{user_id}", unsubscribe_path(group_id)),
            signature,
        )?;
        Ok((user_id, group_id))
    }

    /// Reply-to address that routes inbound replies back to the group.
    pub fn reply_to_address(&self, group_id: GroupId) -> String {
        let signature = self.sign(&format!("reply-to:{group_id}"));
        format!(
            "{group_id}.{}@{}",
            &signature[..REPLY_SIGNATURE_LEN],
            self.reply_hostname
        )
    }

    /// Recover the group id from a reply-to address, rejecting forgeries.
    pub fn group_id_from_reply_address(&self, address: &str) -> Result<GroupId, NotifyError> {
        let local = address
            .rsplit_once('@')
            .map(|(local, _)| local)
            .unwrap_or(address)
            .to_ascii_lowercase();
        let (group_id, signature) = local
            .split_once('.')
            .ok_or_else(|| NotifyError::Signature(format!("malformed reply address '{address}'")))?;
        let group_id: GroupId = group_id
            .parse()
            .map_err(|_| NotifyError::Signature(format!("malformed reply address '{address}'")))?;

        let bytes = hex::decode(signature)
            .map_err(|_| NotifyError::Signature(format!("malformed reply address '{address}'")))?;
        if bytes.len() * 2 != REPLY_SIGNATURE_LEN {
            return Err(NotifyError::Signature(format!(
                "malformed reply address '{address}'"
            )));
        }
        let mut mac = self.mac.clone();
        mac.update(format!("reply-to:{group_id}").as_bytes());
        mac.verify_truncated_left(&bytes).map_err(|_| {
            NotifyError::Signature(format!("reply address '{address}' does not match"))
        })?;
        Ok(group_id)
    }

    fn path_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    fn sign(&self, message: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify(&self, message: &str, signature: &str) -> Result<(), NotifyError> {
        let bytes = hex::decode(signature)
            .map_err(|_| NotifyError::Signature("signature is not hex".to_string()))?;
        let mut mac = self.mac.clone();
        mac.update(message.as_bytes());
        mac.verify_slice(&bytes)
            .map_err(|_| NotifyError::Signature("signature mismatch".to_string()))
    }
}

fn unsubscribe_path(group_id: GroupId) -> String {
    format!("/account/settings/notifications/unsubscribe/issue/{group_id}/")
}
