use parlor_common::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::PolicyViolation;
use crate::pair::PairKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub creator: String,
    pub members: BTreeSet<String>,
    pub messages: Vec<ChatMessage>,
}

impl Group {
    fn new(creator: &str) -> Self {
        Group {
            creator: creator.to_owned(),
            members: BTreeSet::from([creator.to_owned()]),
            messages: Vec::new(),
        }
    }

    pub fn is_member(&self, user: &str) -> bool {
        self.members.contains(user)
    }
}

/// All private conversations and groups. Logs are append-only; the store
/// never deletes a private conversation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChatStore {
    private: BTreeMap<PairKey, Vec<ChatMessage>>,
    groups: BTreeMap<String, Group>,
}

impl ChatStore {
    pub fn from_parts(
        private: BTreeMap<PairKey, Vec<ChatMessage>>,
        groups: BTreeMap<String, Group>,
    ) -> Self {
        ChatStore { private, groups }
    }

    pub fn private_chats(&self) -> &BTreeMap<PairKey, Vec<ChatMessage>> {
        &self.private
    }

    pub fn groups(&self) -> &BTreeMap<String, Group> {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn clear(&mut self) {
        self.private.clear();
        self.groups.clear();
    }

    // ---- private conversations ----

    pub fn append_private(&mut self, a: &str, b: &str, message: ChatMessage) {
        self.private
            .entry(PairKey::new(a, b))
            .or_default()
            .push(message);
    }

    /// Empty when the two users never talked.
    pub fn private_history(&self, a: &str, b: &str) -> &[ChatMessage] {
        self.private
            .get(&PairKey::new(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn private_chats_of<'a>(
        &'a self,
        user: &'a str,
    ) -> impl Iterator<Item = (&'a PairKey, &'a [ChatMessage])> + 'a {
        self.private
            .iter()
            .filter(move |(key, _)| key.contains(user))
            .map(|(key, log)| (key, log.as_slice()))
    }

    // ---- groups ----

    pub fn groups_of<'a>(&'a self, user: &'a str) -> impl Iterator<Item = (&'a str, &'a Group)> + 'a {
        self.groups
            .iter()
            .filter(move |(_, g)| g.is_member(user))
            .map(|(name, g)| (name.as_str(), g))
    }

    pub fn create_group(&mut self, name: &str, creator: &str) -> Result<(), PolicyViolation> {
        if self.groups.contains_key(name) {
            return Err(PolicyViolation::GroupExists(name.to_owned()));
        }
        self.groups.insert(name.to_owned(), Group::new(creator));
        Ok(())
    }

    pub fn join_group(&mut self, name: &str, user: &str) -> Result<(), PolicyViolation> {
        let group = self.group_mut(name)?;
        if !group.members.insert(user.to_owned()) {
            return Err(PolicyViolation::AlreadyMember(name.to_owned()));
        }
        Ok(())
    }

    /// The creator is not allowed to leave: the group would be left with
    /// an owner outside of it. Deleting is the way out for a creator.
    pub fn leave_group(&mut self, name: &str, user: &str) -> Result<(), PolicyViolation> {
        let group = self.group_mut(name)?;
        if group.creator == user {
            return Err(PolicyViolation::CreatorCannotLeave(name.to_owned()));
        }
        if !group.members.remove(user) {
            return Err(PolicyViolation::NotMember(name.to_owned()));
        }
        Ok(())
    }

    /// Moves the whole group under `new_name`; the old key stops resolving.
    pub fn rename_group(
        &mut self,
        name: &str,
        new_name: &str,
        requester: &str,
    ) -> Result<&Group, PolicyViolation> {
        let group = self.group_ref(name)?;
        if group.creator != requester {
            return Err(PolicyViolation::NotCreator(name.to_owned()));
        }
        if self.groups.contains_key(new_name) {
            return Err(PolicyViolation::GroupExists(new_name.to_owned()));
        }
        let group = self
            .groups
            .remove(name)
            .ok_or_else(|| PolicyViolation::GroupNotFound(name.to_owned()))?;
        Ok(&*self.groups.entry(new_name.to_owned()).or_insert(group))
    }

    /// Returns the removed group so callers can notify its former members.
    pub fn delete_group(&mut self, name: &str, requester: &str) -> Result<Group, PolicyViolation> {
        if self.group_ref(name)?.creator != requester {
            return Err(PolicyViolation::NotCreator(name.to_owned()));
        }
        self.groups
            .remove(name)
            .ok_or_else(|| PolicyViolation::GroupNotFound(name.to_owned()))
    }

    /// Membership is checked at append time only.
    pub fn append_group_message(
        &mut self,
        name: &str,
        sender: &str,
        message: ChatMessage,
    ) -> Result<&Group, PolicyViolation> {
        let group = self.group_mut(name)?;
        if !group.is_member(sender) {
            return Err(PolicyViolation::NotMember(name.to_owned()));
        }
        group.messages.push(message);
        Ok(&*group)
    }

    pub fn list_members(
        &self,
        name: &str,
        requester: &str,
    ) -> Result<&BTreeSet<String>, PolicyViolation> {
        let group = self.group_ref(name)?;
        if !group.is_member(requester) {
            return Err(PolicyViolation::NotMember(name.to_owned()));
        }
        Ok(&group.members)
    }

    /// Empty for a group that does not exist (or no longer does).
    pub fn group_history(&self, name: &str, requester: &str) -> Result<&[ChatMessage], PolicyViolation> {
        match self.groups.get(name) {
            None => Ok(&[] as &[ChatMessage]),
            Some(g) if g.is_member(requester) => Ok(g.messages.as_slice()),
            Some(_) => Err(PolicyViolation::NotMember(name.to_owned())),
        }
    }

    fn group_ref(&self, name: &str) -> Result<&Group, PolicyViolation> {
        self.groups
            .get(name)
            .ok_or_else(|| PolicyViolation::GroupNotFound(name.to_owned()))
    }

    fn group_mut(&mut self, name: &str) -> Result<&mut Group, PolicyViolation> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| PolicyViolation::GroupNotFound(name.to_owned()))
    }
}
