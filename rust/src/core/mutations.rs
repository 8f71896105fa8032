//! Mutation sites. Each builds a [`Mutation`] with a minimal local patch and
//! its inverse; the optimistic flow does the rest.

use crate::api::{decode, ApiRequest};
use crate::cache::{PageCollection, QueryData, QueryKey};
use crate::error::FieldError;
use crate::model::{
    Conversation, FriendRequest, InviteLink, Message, Page, UserSummary, LOCAL_ID_PREFIX,
};
use crate::state::now_millis;

use super::optimistic::{inverse, Mutation};
use super::AppCore;

fn chat_and_lists(chat_id: &str) -> Vec<QueryKey> {
    let mut keys = QueryKey::chat_lists().to_vec();
    keys.push(QueryKey::chat(chat_id));
    keys
}

impl AppCore {
    pub(super) fn set_archived(&mut self, chat_id: &str, archived: bool) {
        let Some(previous) = self.cache.find_conversation(chat_id).map(|c| c.archived) else {
            return;
        };
        if previous == archived {
            return;
        }
        let id = chat_id.to_string();
        let (request, label) = if archived {
            (
                ApiRequest::ArchiveChat {
                    chat_id: id.clone(),
                },
                "Couldn't archive chat",
            )
        } else {
            (
                ApiRequest::UnarchiveChat {
                    chat_id: id.clone(),
                },
                "Couldn't unarchive chat",
            )
        };
        // Both lists are projected together and split on the flag, so flipping
        // it moves the chat between them.
        let mutation = Mutation::new(format!("archive:{chat_id}"), request, label)
            .patch(move |cache| {
                cache.update_conversation(&id, |c| c.archived = archived);
                inverse(move |cache| {
                    cache.update_conversation(&id, |c| c.archived = previous);
                })
            })
            .invalidate(QueryKey::chat_lists());
        self.begin_mutation(mutation);
    }

    pub(super) fn mark_chat_read(&mut self, chat_id: &str) {
        let unread = self
            .cache
            .find_conversation(chat_id)
            .is_some_and(|c| !c.read);
        if !unread {
            return;
        }
        let id = chat_id.to_string();
        let mutation = Mutation::new(
            format!("read:{chat_id}"),
            ApiRequest::MarkChatRead {
                chat_id: chat_id.to_string(),
            },
            "Couldn't mark chat as read",
        )
        .patch(move |cache| {
            cache.update_conversation(&id, |c| c.read = true);
            inverse(move |cache| {
                cache.update_conversation(&id, |c| c.read = false);
            })
        });
        self.begin_mutation(mutation);
    }

    pub(super) fn set_pinned(&mut self, chat_id: &str, message_id: &str, pinned: bool) {
        let Some(previous) = self
            .cache
            .find_message(chat_id, message_id)
            .map(|m| m.pinned)
        else {
            return;
        };
        let request = if pinned {
            ApiRequest::PinMessage {
                message_id: message_id.to_string(),
            }
        } else {
            ApiRequest::UnpinMessage {
                message_id: message_id.to_string(),
            }
        };
        let label = if pinned {
            "Couldn't pin message"
        } else {
            "Couldn't unpin message"
        };
        let chat = chat_id.to_string();
        let id = message_id.to_string();
        let on_success_chat = chat.clone();
        let mutation = Mutation::new(format!("pin:{message_id}"), request, label)
            .patch(move |cache| {
                cache.update_messages(&chat, |p| p.update(&id, |m| m.pinned = pinned));
                inverse(move |cache| {
                    cache.update_messages(&chat, |p| p.update(&id, |m| m.pinned = previous));
                })
            })
            .on_success(move |core, value| {
                core.absorb_server_message(&on_success_chat, value);
            });
        self.begin_mutation(mutation);
    }

    pub(super) fn edit_message(&mut self, chat_id: &str, message_id: &str, content: &str) {
        let content = content.trim().to_string();
        if content.is_empty() {
            self.state.form_errors = vec![FieldError {
                field: "content".into(),
                message: "Message can't be empty".into(),
            }];
            self.emit_state();
            return;
        }
        let Some(previous) = self.cache.find_message(chat_id, message_id).cloned() else {
            return;
        };
        if previous.content == content {
            return;
        }
        let chat = chat_id.to_string();
        let on_success_chat = chat.clone();
        let id = message_id.to_string();
        let mutation = Mutation::new(
            format!("edit:{message_id}"),
            ApiRequest::EditMessage {
                message_id: message_id.to_string(),
                content: content.clone(),
            },
            "Couldn't edit message",
        )
        .form()
        .patch(move |cache| {
            cache.update_messages(&chat, |p| {
                p.update(&id, |m| {
                    m.content = content;
                    m.edited = true;
                })
            });
            inverse(move |cache| {
                cache.update_messages(&chat, |p| p.replace(&id, previous));
            })
        })
        .on_success(move |core, value| {
            core.absorb_server_message(&on_success_chat, value);
        })
        .invalidate(QueryKey::chat_lists());
        self.begin_mutation(mutation);
    }

    /// Replace the cached message with the server's canonical copy, if one came back.
    fn absorb_server_message(&mut self, chat_id: &str, value: serde_json::Value) {
        if value.is_null() {
            return;
        }
        match decode::<Message>(value) {
            Ok(message) => {
                let id = message.id.clone();
                self.cache
                    .update_messages(chat_id, |p| p.replace(&id, message));
            }
            Err(e) => tracing::debug!(err = %e, "ignoring non-message response"),
        }
    }

    pub(super) fn set_blocked(&mut self, user_id: &str, blocked: bool) {
        if Some(user_id) == self.my_user_id() {
            return;
        }
        let user = self.known_user(user_id);
        let id = user_id.to_string();
        let (request, label) = if blocked {
            (
                ApiRequest::BlockUser {
                    user_id: id.clone(),
                },
                "Couldn't block user",
            )
        } else {
            (
                ApiRequest::UnblockUser {
                    user_id: id.clone(),
                },
                "Couldn't unblock user",
            )
        };
        // One guard for both directions: block and unblock never interleave.
        let mutation = Mutation::new(format!("block:{user_id}"), request, label)
            .patch(move |cache| {
                let key = QueryKey::BlockedUsers;
                if blocked {
                    let added = cache.update_user_list(&key, |list| {
                        if list.iter().any(|u| u.id == id) {
                            return false;
                        }
                        list.push(user);
                        true
                    });
                    if !added {
                        return None;
                    }
                    inverse(move |cache| {
                        cache.update_user_list(&QueryKey::BlockedUsers, |list| {
                            let before = list.len();
                            list.retain(|u| u.id != id);
                            list.len() != before
                        });
                    })
                } else {
                    let mut removed = None;
                    cache.update_user_list(&key, |list| {
                        let index = list.iter().position(|u| u.id == id);
                        removed = index.map(|i| (i, list.remove(i)));
                        removed.is_some()
                    });
                    let (index, user) = removed?;
                    inverse(move |cache| {
                        cache.update_user_list(&QueryKey::BlockedUsers, |list| {
                            if list.iter().any(|u| u.id == user.id) {
                                return false;
                            }
                            list.insert(index.min(list.len()), user);
                            true
                        });
                    })
                }
            })
            .invalidate([QueryKey::BlockedUsers]);
        self.begin_mutation(mutation);
    }

    pub(super) fn send_friend_request(&mut self, user_id: &str) {
        let Some(me) = self.my_user_id().map(UserSummary::bare) else {
            return;
        };
        let already = self.cache.friend_requests().is_some_and(|lists| {
            lists.outgoing.iter().any(|r| r.to_user.id == user_id)
        });
        if already {
            return;
        }
        let provisional = FriendRequest {
            id: format!("{LOCAL_ID_PREFIX}request-{user_id}"),
            from_user: me,
            to_user: self.known_user(user_id),
            created_at: now_millis(),
        };
        let provisional_id = provisional.id.clone();
        let success_id = provisional_id.clone();
        let mutation = Mutation::new(
            format!("friend-request:{user_id}"),
            ApiRequest::SendFriendRequest {
                user_id: user_id.to_string(),
            },
            "Couldn't send friend request",
        )
        .patch(move |cache| {
            if !cache.update_friend_requests(|lists| {
                lists.outgoing.insert(0, provisional);
                true
            }) {
                return None;
            }
            inverse(move |cache| {
                cache.update_friend_requests(|lists| {
                    let before = lists.outgoing.len();
                    lists.outgoing.retain(|r| r.id != provisional_id);
                    lists.outgoing.len() != before
                });
            })
        })
        .on_success(move |core, value| {
            if let Ok(request) = decode::<FriendRequest>(value) {
                core.cache.update_friend_requests(|lists| {
                    match lists.outgoing.iter().position(|r| r.id == success_id) {
                        Some(i) => lists.outgoing[i] = request,
                        None => lists.outgoing.insert(0, request),
                    }
                    true
                });
            }
        })
        .success_toast("Friend request sent")
        .invalidate([QueryKey::FriendRequests]);
        self.begin_mutation(mutation);
    }

    pub(super) fn answer_friend_request(&mut self, request_id: &str, accept: bool) {
        let (request, label, mut invalidate) = if accept {
            (
                ApiRequest::AcceptFriendRequest {
                    request_id: request_id.to_string(),
                },
                "Couldn't accept friend request",
                vec![QueryKey::Friends],
            )
        } else {
            (
                ApiRequest::RejectFriendRequest {
                    request_id: request_id.to_string(),
                },
                "Couldn't decline friend request",
                vec![],
            )
        };
        invalidate.push(QueryKey::FriendRequests);
        let id = request_id.to_string();
        let mutation = Mutation::new(format!("friend-request:{request_id}"), request, label)
            .patch(move |cache| {
                let mut removed = None;
                cache.update_friend_requests(|lists| {
                    let index = lists.incoming.iter().position(|r| r.id == id);
                    removed = index.map(|i| (i, lists.incoming.remove(i)));
                    removed.is_some()
                });
                let (index, request) = removed?;
                let from = request.from_user.clone();
                if accept {
                    cache.update_user_list(&QueryKey::Friends, |list| {
                        if list.iter().any(|u| u.id == from.id) {
                            return false;
                        }
                        list.push(from.clone());
                        true
                    });
                }
                inverse(move |cache| {
                    cache.update_friend_requests(|lists| {
                        lists.incoming.insert(index.min(lists.incoming.len()), request);
                        true
                    });
                    if accept {
                        cache.update_user_list(&QueryKey::Friends, |list| {
                            let before = list.len();
                            list.retain(|u| u.id != from.id);
                            list.len() != before
                        });
                    }
                })
            })
            .invalidate(invalidate);
        self.begin_mutation(mutation);
    }

    pub(super) fn cancel_friend_request(&mut self, request_id: &str) {
        if request_id.starts_with(LOCAL_ID_PREFIX) {
            // Still being sent; the guard on the send covers it.
            return;
        }
        let id = request_id.to_string();
        let mutation = Mutation::new(
            format!("friend-request:{request_id}"),
            ApiRequest::CancelFriendRequest {
                request_id: request_id.to_string(),
            },
            "Couldn't cancel friend request",
        )
        .patch(move |cache| {
            let mut removed = None;
            cache.update_friend_requests(|lists| {
                let index = lists.outgoing.iter().position(|r| r.id == id);
                removed = index.map(|i| (i, lists.outgoing.remove(i)));
                removed.is_some()
            });
            let (index, request) = removed?;
            inverse(move |cache| {
                cache.update_friend_requests(|lists| {
                    lists.outgoing.insert(index.min(lists.outgoing.len()), request);
                    true
                });
            })
        })
        .invalidate([QueryKey::FriendRequests]);
        self.begin_mutation(mutation);
    }

    pub(super) fn create_group(&mut self, name: &str, member_ids: Vec<String>) {
        let name = name.trim().to_string();
        let mut errors = Vec::new();
        if name.is_empty() {
            errors.push(FieldError {
                field: "name".into(),
                message: "Group name can't be empty".into(),
            });
        }
        if member_ids.is_empty() {
            errors.push(FieldError {
                field: "memberIds".into(),
                message: "Pick at least one member".into(),
            });
        }
        if !errors.is_empty() {
            self.state.form_errors = errors;
            self.emit_state();
            return;
        }
        let mutation = Mutation::new(
            "group:create",
            ApiRequest::CreateGroup { name, member_ids },
            "Couldn't create group",
        )
        .form()
        .busy(|b| &mut b.creating_group)
        .on_success(|core, value| core.adopt_new_conversation(value))
        .invalidate(QueryKey::chat_lists());
        self.begin_mutation(mutation);
    }

    pub(super) fn join_via_invite(&mut self, code: &str) {
        let code = code.trim().to_string();
        if code.is_empty() {
            self.state.form_errors = vec![FieldError {
                field: "code".into(),
                message: "Enter an invite code".into(),
            }];
            self.emit_state();
            return;
        }
        let mutation = Mutation::new(
            format!("join:{code}"),
            ApiRequest::JoinViaInvite { code },
            "Couldn't join group",
        )
        .form()
        .busy(|b| &mut b.joining_group)
        .on_success(|core, value| core.adopt_new_conversation(value))
        .invalidate(QueryKey::chat_lists());
        self.begin_mutation(mutation);
    }

    /// A conversation the server just created for us: list it and open it.
    fn adopt_new_conversation(&mut self, value: serde_json::Value) {
        let conversation: Conversation = match decode(value) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(err = %e, "new conversation response unreadable");
                return;
            }
        };
        let chat_id = conversation.id.clone();
        let key = QueryKey::chat_list(false);
        if self.cache.contains(&key) {
            let listed = conversation.clone();
            self.cache.update(&key, move |data| match data {
                QueryData::Chats(pages) if !pages.contains(&listed.id) => {
                    let mut next = pages.clone();
                    next.push_first(listed);
                    Some(QueryData::Chats(next))
                }
                _ => None,
            });
        } else {
            self.cache.set(
                key,
                QueryData::Chats(PageCollection::from_first_page(Page::new(
                    vec![conversation.clone()],
                    None,
                ))),
            );
        }
        self.cache
            .set(QueryKey::chat(&chat_id), QueryData::Chat(conversation));
        self.open_chat(chat_id);
    }

    pub(super) fn update_group(
        &mut self,
        chat_id: &str,
        name: Option<String>,
        avatar: Option<String>,
    ) {
        let name = name.map(|n| n.trim().to_string());
        if name.as_deref() == Some("") {
            self.state.form_errors = vec![FieldError {
                field: "name".into(),
                message: "Group name can't be empty".into(),
            }];
            self.emit_state();
            return;
        }
        if name.is_none() && avatar.is_none() {
            return;
        }
        let Some(previous) = self
            .cache
            .find_conversation(chat_id)
            .map(|c| (c.name.clone(), c.avatar.clone()))
        else {
            return;
        };
        let id = chat_id.to_string();
        let (next_name, next_avatar) = (name.clone(), avatar.clone());
        let mutation = Mutation::new(
            format!("group:{chat_id}"),
            ApiRequest::UpdateGroup {
                chat_id: chat_id.to_string(),
                name,
                avatar,
            },
            "Couldn't update group",
        )
        .form()
        .patch(move |cache| {
            cache.update_conversation(&id, |c| {
                if let Some(n) = &next_name {
                    c.name = Some(n.clone());
                }
                if let Some(a) = &next_avatar {
                    c.avatar = Some(a.clone());
                }
            });
            inverse(move |cache| {
                cache.update_conversation(&id, |c| {
                    c.name = previous.0.clone();
                    c.avatar = previous.1.clone();
                });
            })
        })
        .invalidate(chat_and_lists(chat_id));
        self.begin_mutation(mutation);
    }

    pub(super) fn add_group_member(&mut self, chat_id: &str, user_id: &str) {
        let already = self
            .cache
            .find_conversation(chat_id)
            .is_some_and(|c| c.participant(user_id).is_some());
        if already {
            return;
        }
        let member = self.known_user(user_id);
        let id = chat_id.to_string();
        let user = user_id.to_string();
        let mutation = Mutation::new(
            format!("member:{chat_id}:{user_id}"),
            ApiRequest::AddGroupMember {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
            },
            "Couldn't add member",
        )
        .patch(move |cache| {
            cache.update_conversation(&id, |c| {
                if c.participant(&member.id).is_none() {
                    c.participants.push(member.clone());
                }
            });
            inverse(move |cache| {
                cache.update_conversation(&id, |c| c.participants.retain(|p| p.id != user));
            })
        })
        .invalidate(chat_and_lists(chat_id));
        self.begin_mutation(mutation);
    }

    pub(super) fn remove_group_member(&mut self, chat_id: &str, user_id: &str) {
        let Some((index, member)) = self.cache.find_conversation(chat_id).and_then(|c| {
            c.participants
                .iter()
                .position(|p| p.id == user_id)
                .map(|i| (i, c.participants[i].clone()))
        }) else {
            return;
        };
        let id = chat_id.to_string();
        let user = user_id.to_string();
        let mutation = Mutation::new(
            format!("member:{chat_id}:{user_id}"),
            ApiRequest::RemoveGroupMember {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
            },
            "Couldn't remove member",
        )
        .patch(move |cache| {
            cache.update_conversation(&id, |c| c.participants.retain(|p| p.id != user));
            inverse(move |cache| {
                cache.update_conversation(&id, |c| {
                    if c.participant(&member.id).is_none() {
                        let at = index.min(c.participants.len());
                        c.participants.insert(at, member.clone());
                    }
                });
            })
        })
        .invalidate(chat_and_lists(chat_id));
        self.begin_mutation(mutation);
    }

    pub(super) fn transfer_ownership(&mut self, chat_id: &str, new_owner_id: &str) {
        let Some(conversation) = self.cache.find_conversation(chat_id) else {
            return;
        };
        let previous = conversation.owner_id.clone();
        let allowed = previous.as_deref() == self.my_user_id()
            && conversation.participant(new_owner_id).is_some();
        if !allowed {
            self.toast("Only the owner can hand a group over, and only to a member");
            return;
        }
        let id = chat_id.to_string();
        let next = new_owner_id.to_string();
        let mutation = Mutation::new(
            format!("owner:{chat_id}"),
            ApiRequest::TransferOwnership {
                chat_id: chat_id.to_string(),
                new_owner_id: new_owner_id.to_string(),
            },
            "Couldn't transfer ownership",
        )
        .patch(move |cache| {
            cache.update_conversation(&id, |c| c.owner_id = Some(next.clone()));
            inverse(move |cache| {
                cache.update_conversation(&id, |c| c.owner_id = previous.clone());
            })
        })
        .success_toast("Ownership transferred")
        .invalidate(chat_and_lists(chat_id));
        self.begin_mutation(mutation);
    }

    pub(super) fn generate_invite_link(&mut self, chat_id: &str) {
        let mutation = Mutation::new(
            format!("invite:{chat_id}"),
            ApiRequest::GenerateInviteLink {
                chat_id: chat_id.to_string(),
            },
            "Couldn't create invite link",
        )
        .busy(|b| &mut b.generating_invite_link)
        .on_success(|core, value| match decode::<InviteLink>(value) {
            Ok(link) => core.state.invite_link = Some(link),
            Err(e) => tracing::warn!(err = %e, "invite link response unreadable"),
        });
        self.begin_mutation(mutation);
    }

    pub(super) fn mark_notifications_read(&mut self) {
        let unread: Vec<String> = self
            .cache
            .notifications()
            .map(|feed| {
                feed.items
                    .iter()
                    .filter(|n| !n.read)
                    .map(|n| n.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        let count = self
            .cache
            .notifications()
            .map(|f| f.unread_count)
            .unwrap_or(0);
        if unread.is_empty() && count == 0 {
            return;
        }
        let mutation = Mutation::new(
            "notifications:read",
            ApiRequest::MarkNotificationsRead,
            "Couldn't mark notifications as read",
        )
        .patch(move |cache| {
            cache.update_notifications(|feed| {
                for n in feed.items.iter_mut() {
                    n.read = true;
                }
                feed.unread_count = 0;
                true
            });
            inverse(move |cache| {
                cache.update_notifications(|feed| {
                    for n in feed.items.iter_mut().filter(|n| unread.contains(&n.id)) {
                        n.read = false;
                    }
                    feed.unread_count += count;
                    true
                });
            })
        });
        self.begin_mutation(mutation);
    }

    /// Best-known summary of a user from whatever is cached.
    fn known_user(&self, user_id: &str) -> UserSummary {
        let cache = &self.cache;
        self.state
            .search
            .results
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .or_else(|| cache.friends().and_then(|l| l.iter().find(|u| u.id == user_id).cloned()))
            .or_else(|| {
                [false, true].into_iter().find_map(|archived| {
                    cache.chats(archived).and_then(|pages| {
                        pages.items().find_map(|c| c.participant(user_id).cloned())
                    })
                })
            })
            .unwrap_or_else(|| UserSummary::bare(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{conversation, seed_chats, seed_messages, signed_in_core, ME};
    use super::*;
    use crate::error::ApiError;
    use crate::model::{FriendRequestLists, Notification, NotificationFeed};

    fn settle_last(
        h: &mut super::super::testing::Harness,
        result: Result<serde_json::Value, ApiError>,
    ) {
        let id = h.core.mutations.last_id();
        h.core.settle_mutation(id, result);
    }

    #[test]
    fn archive_moves_chat_between_lists_and_rolls_back() {
        let mut h = signed_in_core();
        seed_chats(
            &mut h.core,
            false,
            vec![conversation("c1", false), conversation("c2", false)],
        );
        h.core.set_archived("c1", true);
        assert!(h
            .core
            .state
            .archived_chat_list
            .iter()
            .any(|c| c.chat_id == "c1"));
        assert!(h.core.state.chat_list.iter().all(|c| c.chat_id != "c1"));

        settle_last(
            &mut h,
            Err(ApiError::Server {
                status: 500,
                message: "boom".into(),
            }),
        );
        assert!(h.core.state.chat_list.iter().any(|c| c.chat_id == "c1"));
        assert_eq!(
            h.core.cache.find_conversation("c1").map(|c| c.archived),
            Some(false)
        );
    }

    #[test]
    fn double_block_sends_once() {
        let mut h = signed_in_core();
        h.core
            .cache
            .set(QueryKey::BlockedUsers, QueryData::BlockedUsers(vec![]));
        h.core.set_blocked("u2", true);
        h.core.set_blocked("u2", true);
        assert_eq!(h.core.mutations.last_id(), 1);
        assert_eq!(h.core.cache.blocked_users().unwrap().len(), 1);
    }

    #[test]
    fn unblock_failure_puts_user_back() {
        let mut h = signed_in_core();
        h.core.cache.set(
            QueryKey::BlockedUsers,
            QueryData::BlockedUsers(vec![UserSummary::bare("u2"), UserSummary::bare("u3")]),
        );
        h.core.set_blocked("u2", false);
        assert_eq!(h.core.cache.blocked_users().unwrap().len(), 1);
        settle_last(&mut h, Err(ApiError::PermissionDenied("nope".into())));
        let ids: Vec<_> = h
            .core
            .cache
            .blocked_users()
            .unwrap()
            .iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(ids, ["u2", "u3"]);
    }

    #[test]
    fn edit_reconciles_with_server_copy() {
        let mut h = signed_in_core();
        seed_messages(&mut h.core, "c1", &["m1"]);
        h.core.edit_message("c1", "m1", "fixed typo");
        let m = h.core.cache.find_message("c1", "m1").unwrap();
        assert_eq!(m.content, "fixed typo");
        assert!(m.edited);

        settle_last(
            &mut h,
            Ok(serde_json::json!({
                "id": "m1", "chatId": "c1", "senderId": "u2",
                "content": "fixed typo (server)", "createdAt": 1000, "edited": true
            })),
        );
        assert_eq!(
            h.core.cache.find_message("c1", "m1").unwrap().content,
            "fixed typo (server)"
        );
    }

    #[test]
    fn empty_edit_is_a_form_error() {
        let mut h = signed_in_core();
        seed_messages(&mut h.core, "c1", &["m1"]);
        h.core.edit_message("c1", "m1", "   ");
        assert_eq!(h.core.state.form_errors[0].field, "content");
        assert_eq!(h.core.mutations.last_id(), 0);
    }

    #[test]
    fn accept_request_moves_sender_to_friends() {
        let mut h = signed_in_core();
        let request = FriendRequest {
            id: "r1".into(),
            from_user: UserSummary::bare("u7"),
            to_user: UserSummary::bare(ME),
            created_at: 1,
        };
        h.core.cache.set(
            QueryKey::FriendRequests,
            QueryData::FriendRequests(FriendRequestLists {
                incoming: vec![request],
                outgoing: vec![],
            }),
        );
        h.core.cache.set(QueryKey::Friends, QueryData::Friends(vec![]));
        h.core.answer_friend_request("r1", true);
        assert!(h.core.cache.friend_requests().unwrap().incoming.is_empty());
        assert_eq!(h.core.cache.friends().unwrap()[0].id, "u7");

        settle_last(&mut h, Err(ApiError::Network("x".into())));
        assert_eq!(h.core.cache.friend_requests().unwrap().incoming.len(), 1);
        assert!(h.core.cache.friends().unwrap().is_empty());
    }

    #[test]
    fn transfer_requires_ownership() {
        let mut h = signed_in_core();
        let mut group = conversation("g1", false);
        group.is_group = true;
        group.owner_id = Some("u2".into());
        seed_chats(&mut h.core, false, vec![group]);
        h.core.transfer_ownership("g1", ME);
        assert_eq!(h.core.mutations.last_id(), 0);
        assert!(h.core.state.toast.is_some());
    }

    #[test]
    fn mark_notifications_read_rolls_back_counts() {
        let mut h = signed_in_core();
        let n = Notification {
            id: "n1".into(),
            kind: "mention".into(),
            actor: None,
            chat_id: None,
            text: "hi".into(),
            created_at: 1,
            read: false,
            provisional: false,
        };
        h.core.cache.set(
            QueryKey::Notifications,
            QueryData::Notifications(NotificationFeed {
                items: vec![n],
                unread_count: 1,
            }),
        );
        h.core.mark_notifications_read();
        assert_eq!(h.core.state.notifications.unread_count, 0);
        settle_last(&mut h, Err(ApiError::Timeout));
        let feed = h.core.cache.notifications().unwrap();
        assert_eq!(feed.unread_count, 1);
        assert!(!feed.items[0].read);
    }
}
