//! Query cache: server-derived data keyed by semantic query identifiers.
//!
//! Entries are immutable `Arc` values. Writers never mutate an entry in place;
//! they compute a replacement from the current value and swap it in, so any
//! snapshot handed out earlier keeps describing the state it was taken from.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::model::{
    Conversation, FriendRequestLists, Message, NotificationFeed, Page, UserSummary,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    ChatList { archived: bool },
    Chat { chat_id: String },
    Messages { chat_id: String },
    Notifications,
    Friends,
    FriendRequests,
    BlockedUsers,
}

impl QueryKey {
    pub fn chat_list(archived: bool) -> Self {
        Self::ChatList { archived }
    }

    pub fn chat(chat_id: &str) -> Self {
        Self::Chat {
            chat_id: chat_id.to_string(),
        }
    }

    pub fn messages(chat_id: &str) -> Self {
        Self::Messages {
            chat_id: chat_id.to_string(),
        }
    }

    /// Both chat-list keys; patches to a conversation touch every list that holds it.
    pub fn chat_lists() -> [Self; 2] {
        [Self::chat_list(false), Self::chat_list(true)]
    }

    pub fn is_chat_list(&self) -> bool {
        matches!(self, Self::ChatList { .. })
    }

    pub fn chat_id(&self) -> Option<&str> {
        match self {
            Self::Chat { chat_id } | Self::Messages { chat_id } => Some(chat_id),
            _ => None,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChatList { archived: false } => f.write_str("chats"),
            Self::ChatList { archived: true } => f.write_str("chats:archived"),
            Self::Chat { chat_id } => write!(f, "chat:{chat_id}"),
            Self::Messages { chat_id } => write!(f, "messages:{chat_id}"),
            Self::Notifications => f.write_str("notifications"),
            Self::Friends => f.write_str("friends"),
            Self::FriendRequests => f.write_str("friend-requests"),
            Self::BlockedUsers => f.write_str("blocked-users"),
        }
    }
}

/// How a fetched page lands in its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Start over from the first page.
    Replace,
    /// Further page after the existing ones.
    Append,
    /// Older page before the existing ones.
    Prepend,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Chats(PageCollection<Conversation>),
    Chat(Conversation),
    Messages(PageCollection<Message>),
    Notifications(NotificationFeed),
    Friends(Vec<UserSummary>),
    FriendRequests(FriendRequestLists),
    BlockedUsers(Vec<UserSummary>),
}

/// Entities that can live in a [`PageCollection`].
pub trait Identified {
    fn entity_id(&self) -> &str;
}

impl Identified for Conversation {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Identified for Message {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Where a removed entity sat, so it can be put back.
#[derive(Debug, Clone, PartialEq)]
pub struct RestorePoint<T> {
    pub page: usize,
    pub index: usize,
    pub item: T,
}

/// Ordered pages fetched for one query key.
///
/// No entity id appears twice across pages; every insert path checks first.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCollection<T> {
    pages: Vec<Page<T>>,
}

impl<T> Default for PageCollection<T> {
    fn default() -> Self {
        Self { pages: Vec::new() }
    }
}

impl<T: Identified + Clone> PageCollection<T> {
    pub fn from_first_page(page: Page<T>) -> Self {
        let mut this = Self::default();
        this.append_page(page);
        this
    }

    pub fn pages(&self) -> &[Page<T>] {
        &self.pages
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|p| p.items.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn find(&self, id: &str) -> Option<&T> {
        self.position(id)
            .map(|(page, index)| &self.pages[page].items[index])
    }

    pub fn position(&self, id: &str) -> Option<(usize, usize)> {
        self.pages.iter().enumerate().find_map(|(page, p)| {
            p.items
                .iter()
                .position(|item| item.entity_id() == id)
                .map(|index| (page, index))
        })
    }

    /// Cursor of the first page (older data for newest-last collections).
    pub fn first_cursor(&self) -> Option<&str> {
        self.pages.first().and_then(|p| p.next_cursor.as_deref())
    }

    /// Cursor of the last page (further data for fetch-ordered collections).
    pub fn last_cursor(&self) -> Option<&str> {
        self.pages.last().and_then(|p| p.next_cursor.as_deref())
    }

    /// Add a page after the existing ones, dropping items already present.
    pub fn append_page(&mut self, page: Page<T>) {
        let page = self.without_known(page);
        self.pages.push(page);
    }

    /// Add a page before the existing ones, dropping items already present.
    pub fn prepend_page(&mut self, page: Page<T>) {
        let page = self.without_known(page);
        self.pages.insert(0, page);
    }

    fn without_known(&self, page: Page<T>) -> Page<T> {
        let mut seen = std::collections::HashSet::new();
        let items = page
            .items
            .into_iter()
            .filter(|item| {
                !self.contains(item.entity_id()) && seen.insert(item.entity_id().to_string())
            })
            .collect();
        Page::new(items, page.next_cursor)
    }

    /// Append to the last page. Returns false if the id is already cached.
    pub fn push_last(&mut self, item: T) -> bool {
        if self.contains(item.entity_id()) {
            return false;
        }
        match self.pages.last_mut() {
            Some(page) => page.items.push(item),
            None => self.pages.push(Page::new(vec![item], None)),
        }
        true
    }

    /// Insert at the front of the first page. Returns false if the id is already cached.
    pub fn push_first(&mut self, item: T) -> bool {
        if self.contains(item.entity_id()) {
            return false;
        }
        match self.pages.first_mut() {
            Some(page) => page.items.insert(0, item),
            None => self.pages.push(Page::new(vec![item], None)),
        }
        true
    }

    pub fn update(&mut self, id: &str, f: impl FnOnce(&mut T)) -> bool {
        let Some((page, index)) = self.position(id) else {
            return false;
        };
        f(&mut self.pages[page].items[index]);
        true
    }

    /// Replace the entity `id` with `item` in place. If `item`'s own id is already
    /// cached elsewhere, `id` is dropped instead so the collection stays duplicate-free.
    pub fn replace(&mut self, id: &str, item: T) -> bool {
        let Some((page, index)) = self.position(id) else {
            return false;
        };
        if item.entity_id() != id && self.contains(item.entity_id()) {
            self.pages[page].items.remove(index);
            return true;
        }
        self.pages[page].items[index] = item;
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<RestorePoint<T>> {
        let (page, index) = self.position(id)?;
        let item = self.pages[page].items.remove(index);
        Some(RestorePoint { page, index, item })
    }

    /// Put a removed entity back where it was (clamped to the current shape).
    /// Returns false if the id is cached again already.
    pub fn restore(&mut self, point: RestorePoint<T>) -> bool {
        if self.contains(point.item.entity_id()) {
            return false;
        }
        if self.pages.is_empty() {
            self.pages.push(Page::new(Vec::new(), None));
        }
        let page = point.page.min(self.pages.len() - 1);
        let items = &mut self.pages[page].items;
        let index = point.index.min(items.len());
        items.insert(index, point.item);
        true
    }

    /// Like [`restore`](Self::restore) for collections kept sorted by `key`.
    /// The removed entity goes back among its peers by key; the recorded slot
    /// only breaks ties, so restores in any order rebuild the same sequence.
    pub fn restore_sorted_by<K: Ord>(
        &mut self,
        point: RestorePoint<T>,
        key: impl Fn(&T) -> K,
    ) -> bool {
        if self.contains(point.item.entity_id()) {
            return false;
        }
        if self.pages.is_empty() {
            self.pages.push(Page::new(Vec::new(), None));
        }
        let k = key(&point.item);
        let before = self.items().filter(|item| key(item) < k).count();
        let through = self.items().filter(|item| key(item) <= k).count();
        let recorded = self.pages[..point.page.min(self.pages.len())]
            .iter()
            .map(|page| page.items.len())
            .sum::<usize>()
            + point.index;
        let mut offset = recorded.clamp(before, through);

        let last = self.pages.len() - 1;
        for (i, page) in self.pages.iter_mut().enumerate() {
            let len = page.items.len();
            if offset < len || (offset == len && (i == last || i == point.page)) {
                page.items.insert(offset, point.item);
                return true;
            }
            offset -= len;
        }
        false
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for page in &mut self.pages {
            page.items.retain(|item| keep(item));
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Arc<QueryData>,
    stale: bool,
}

/// Process-wide store of query results. Owned by the app actor and handed to
/// writers explicitly; there is no global instance.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, CacheEntry>,
    rev: u64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every write; observers compare it to detect change.
    pub fn revision(&self) -> u64 {
        self.rev
    }

    pub fn get(&self, key: &QueryKey) -> Option<&QueryData> {
        self.entries.get(key).map(|e| e.data.as_ref())
    }

    #[cfg(test)]
    pub fn snapshot(&self, key: &QueryKey) -> Option<Arc<QueryData>> {
        self.entries.get(key).map(|e| e.data.clone())
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).map(|e| e.stale).unwrap_or(true)
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.keys()
    }

    pub fn set(&mut self, key: QueryKey, data: QueryData) {
        self.rev += 1;
        self.entries.insert(
            key,
            CacheEntry {
                data: Arc::new(data),
                stale: false,
            },
        );
    }

    /// Compute a replacement for `key` from its current value. `f` returns `None`
    /// to leave the entry untouched. Returns whether the entry changed.
    pub fn update(
        &mut self,
        key: &QueryKey,
        f: impl FnOnce(&QueryData) -> Option<QueryData>,
    ) -> bool {
        let Some(entry) = self.entries.get(key) else {
            return false;
        };
        let Some(next) = f(&entry.data) else {
            return false;
        };
        self.rev += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.data = Arc::new(next);
        }
        true
    }

    /// [`update`](Self::update) applied to every key matching `pred`.
    pub fn update_where(
        &mut self,
        pred: impl Fn(&QueryKey) -> bool,
        mut f: impl FnMut(&QueryKey, &QueryData) -> Option<QueryData>,
    ) -> usize {
        let keys: Vec<QueryKey> = self.entries.keys().filter(|k| pred(k)).cloned().collect();
        keys.into_iter()
            .filter(|key| self.update(key, |data| f(key, data)))
            .count()
    }

    /// Mark `key` stale. Data stays readable until the refetch lands.
    pub fn invalidate(&mut self, key: &QueryKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    pub fn invalidate_where(&mut self, pred: impl Fn(&QueryKey) -> bool) -> Vec<QueryKey> {
        let mut hit = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            if pred(key) {
                entry.stale = true;
                hit.push(key.clone());
            }
        }
        hit
    }

    pub fn remove(&mut self, key: &QueryKey) -> Option<Arc<QueryData>> {
        let removed = self.entries.remove(key).map(|e| e.data);
        if removed.is_some() {
            self.rev += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.rev += 1;
    }

    // Typed accessors used by the reconciler and the mutators.

    pub fn chats(&self, archived: bool) -> Option<&PageCollection<Conversation>> {
        match self.get(&QueryKey::chat_list(archived)) {
            Some(QueryData::Chats(pages)) => Some(pages),
            _ => None,
        }
    }

    pub fn messages(&self, chat_id: &str) -> Option<&PageCollection<Message>> {
        match self.get(&QueryKey::messages(chat_id)) {
            Some(QueryData::Messages(pages)) => Some(pages),
            _ => None,
        }
    }

    pub fn chat_detail(&self, chat_id: &str) -> Option<&Conversation> {
        match self.get(&QueryKey::chat(chat_id)) {
            Some(QueryData::Chat(c)) => Some(c),
            _ => None,
        }
    }

    pub fn notifications(&self) -> Option<&NotificationFeed> {
        match self.get(&QueryKey::Notifications) {
            Some(QueryData::Notifications(feed)) => Some(feed),
            _ => None,
        }
    }

    pub fn friends(&self) -> Option<&[UserSummary]> {
        match self.get(&QueryKey::Friends) {
            Some(QueryData::Friends(list)) => Some(list),
            _ => None,
        }
    }

    pub fn friend_requests(&self) -> Option<&FriendRequestLists> {
        match self.get(&QueryKey::FriendRequests) {
            Some(QueryData::FriendRequests(lists)) => Some(lists),
            _ => None,
        }
    }

    pub fn blocked_users(&self) -> Option<&[UserSummary]> {
        match self.get(&QueryKey::BlockedUsers) {
            Some(QueryData::BlockedUsers(list)) => Some(list),
            _ => None,
        }
    }

    /// Find a conversation in the detail key or any chat list.
    pub fn find_conversation(&self, chat_id: &str) -> Option<&Conversation> {
        self.chat_detail(chat_id).or_else(|| {
            [false, true]
                .into_iter()
                .find_map(|archived| self.chats(archived).and_then(|p| p.find(chat_id)))
        })
    }

    pub fn find_message(&self, chat_id: &str, message_id: &str) -> Option<&Message> {
        self.messages(chat_id).and_then(|p| p.find(message_id))
    }

    /// Apply `f` to every cached copy of conversation `chat_id` (both chat lists
    /// and the detail key). Returns the number of entries changed.
    pub fn update_conversation(&mut self, chat_id: &str, f: impl Fn(&mut Conversation)) -> usize {
        self.update_where(
            |key| {
                key.is_chat_list()
                    || (matches!(key, QueryKey::Chat { .. }) && key.chat_id() == Some(chat_id))
            },
            |_, data| match data {
                QueryData::Chats(pages) if pages.contains(chat_id) => {
                    let mut next = pages.clone();
                    next.update(chat_id, &f);
                    Some(QueryData::Chats(next))
                }
                QueryData::Chat(c) if c.id == chat_id => {
                    let mut next = c.clone();
                    f(&mut next);
                    Some(QueryData::Chat(next))
                }
                _ => None,
            },
        )
    }

    /// Copy-on-write edit of a chat's message collection.
    pub fn update_messages(
        &mut self,
        chat_id: &str,
        f: impl FnOnce(&mut PageCollection<Message>) -> bool,
    ) -> bool {
        self.update(&QueryKey::messages(chat_id), |data| match data {
            QueryData::Messages(pages) => {
                let mut next = pages.clone();
                f(&mut next).then_some(QueryData::Messages(next))
            }
            _ => None,
        })
    }

    pub fn update_notifications(&mut self, f: impl FnOnce(&mut NotificationFeed) -> bool) -> bool {
        self.update(&QueryKey::Notifications, |data| match data {
            QueryData::Notifications(feed) => {
                let mut next = feed.clone();
                f(&mut next).then_some(QueryData::Notifications(next))
            }
            _ => None,
        })
    }

    pub fn update_friend_requests(
        &mut self,
        f: impl FnOnce(&mut FriendRequestLists) -> bool,
    ) -> bool {
        self.update(&QueryKey::FriendRequests, |data| match data {
            QueryData::FriendRequests(lists) => {
                let mut next = lists.clone();
                f(&mut next).then_some(QueryData::FriendRequests(next))
            }
            _ => None,
        })
    }

    pub fn update_user_list(
        &mut self,
        key: &QueryKey,
        f: impl FnOnce(&mut Vec<UserSummary>) -> bool,
    ) -> bool {
        self.update(key, |data| match data {
            QueryData::Friends(list) => {
                let mut next = list.clone();
                f(&mut next).then_some(QueryData::Friends(next))
            }
            QueryData::BlockedUsers(list) => {
                let mut next = list.clone();
                f(&mut next).then_some(QueryData::BlockedUsers(next))
            }
            _ => None,
        })
    }
}
