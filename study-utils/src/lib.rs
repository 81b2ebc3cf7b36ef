pub mod grading;
pub mod keys;
pub mod progress;
pub mod quiz;

use serde::{Deserialize, Serialize};

/// Who may see a channel in listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// The viewer's stored identity: a display name and the secret that proves
/// ownership of channels published under that name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub name: String,
    pub secret: String,
}

/// A user-submitted variant of a note, stored remotely under
/// `notes/{sanitized path}/{id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Remote sub-key (the sanitized owner name); not part of the stored
    /// value, filled in from the tree key after a read.
    #[serde(skip)]
    pub id: String,
    pub owner_name: String,
    pub owner_secret: String,
    pub visibility: Visibility,
    pub content: String,
}

impl Channel {
    /// Public channels are visible to everyone; private ones only to their
    /// owner.
    pub fn visible_to(&self, viewer: Option<&Credentials>) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::Private => viewer.is_some_and(|v| v.name == self.owner_name),
        }
    }

    /// Deletion requires the full credential pair to match, not just the
    /// name.
    pub fn deletable_by(&self, viewer: &Credentials) -> bool {
        viewer.name == self.owner_name && viewer.secret == self.owner_secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(visibility: Visibility) -> Channel {
        Channel {
            id: "ada".to_string(),
            owner_name: "ada".to_string(),
            owner_secret: "s3cret".to_string(),
            visibility,
            content: "# Notes".to_string(),
        }
    }

    fn creds(name: &str, secret: &str) -> Credentials {
        Credentials {
            name: name.to_string(),
            secret: secret.to_string(),
        }
    }

    #[test]
    fn public_channel_is_visible_to_everyone() {
        let ch = channel(Visibility::Public);
        assert!(ch.visible_to(None));
        assert!(ch.visible_to(Some(&creds("bob", "x"))));
        assert!(ch.visible_to(Some(&creds("ada", "s3cret"))));
    }

    #[test]
    fn private_channel_is_visible_only_to_its_owner() {
        let ch = channel(Visibility::Private);
        assert!(!ch.visible_to(None));
        assert!(!ch.visible_to(Some(&creds("bob", "x"))));
        assert!(ch.visible_to(Some(&creds("ada", "s3cret"))));
    }

    #[test]
    fn deletion_needs_both_name_and_secret() {
        let ch = channel(Visibility::Public);
        assert!(ch.deletable_by(&creds("ada", "s3cret")));
        assert!(!ch.deletable_by(&creds("ada", "wrong")));
        assert!(!ch.deletable_by(&creds("bob", "s3cret")));
    }

    #[test]
    fn channel_id_is_not_part_of_the_stored_value() {
        let ch = channel(Visibility::Public);
        let value = serde_json::to_value(&ch).unwrap();
        assert!(value.get("id").is_none());
        let back: Channel = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, "");
        assert_eq!(back.owner_name, "ada");
    }
}
