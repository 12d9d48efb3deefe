//! Owner-scoped slash commands managing routes.

use {
    ferry_channels::{MediaKind, MessageSnapshot, SendRequest},
    ferry_common::{ChatId, OwnerId, RouteKey},
    ferry_filters::perceptual_hash,
    tracing::{debug, info, warn},
};

use crate::{
    error::Error,
    report,
    routes::{Route, RouteEntry, RouteMutation},
    service::Relay,
};

const HELP: &str = "\
Ferry Commands

Setup & Management
/setpair <name> <source> <dest> [yes|no] - Add a forwarding pair (yes removes mentions)
/listpairs - Show all pairs
/pausepair <name> - Pause a pair
/startpair <name> - Resume a pair
/clearpairs - Remove all pairs
/togglementions <name> - Toggle mention removal
/monitor - View pair stats
/status - Check relay status

Filters
/addblacklist <name> <word1,word2,...> - Blacklist words
/clearblacklist <name> - Clear blacklist
/showblacklist <name> - Show blacklist
/toggleurlblock <name> - Toggle URL blocking
/addurlblacklist <name> <url1,url2,...> - Blacklist specific URLs
/clearurlblacklist <name> - Clear URL blacklist
/setheader <name> <text> - Set header to remove
/setfooter <name> <text> - Set footer to remove
/clearheaderfooter <name> - Clear header/footer

Image Blocking
/blockimage <name> - Block an image (reply to a photo)
/clearblockedimages <name> - Clear blocked images
/showblockedimages <name> - Show blocked image hashes

Custom Text
/setcustomheader <name> <text> - Set custom header
/setcustomfooter <name> <text> - Set custom footer
/clearcustomheaderfooter <name> - Clear custom text

Blocking
/blocksentence <name> <sentence> - Block a sentence
/clearblocksentences <name> - Clear blocked sentences
/showblocksentences <name> - Show blocked sentences";

const NOT_FOUND: &str = "Pair not found.";
const NO_PAIRS: &str = "No forwarding pairs found.";

/// Read-only listing of one route setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Blacklist,
    BlockedSentences,
    BlockedImages,
}

/// A parsed admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Start,
    Help,
    Status,
    Monitor,
    ListPairs,
    SetPair {
        name: String,
        source: ChatId,
        destination: ChatId,
        remove_mentions: bool,
    },
    ClearPairs,
    Mutate {
        name: String,
        mutation: RouteMutation,
    },
    Show {
        name: String,
        listing: Listing,
    },
    BlockImage {
        name: String,
    },
}

/// Why a command line could not be parsed. Displays as the reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown command. Use /commands for options.")]
    Unknown,
    #[error("Not a command.")]
    NotACommand,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split off the first whitespace-delimited word.
fn next_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

impl AdminCommand {
    /// Parse `/name args`. A `@botname` suffix on the command is ignored.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim();
        let Some(body) = text.strip_prefix('/') else {
            return Err(ParseError::NotACommand);
        };
        let (command, rest) = next_word(body);
        let command = command
            .split('@')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let (name, tail) = next_word(rest);
        let name = name.to_string();

        let need_name = |usage: &'static str| {
            if name.is_empty() {
                Err(ParseError::Usage(usage))
            } else {
                Ok(name.clone())
            }
        };
        let need_text = |usage: &'static str| {
            if name.is_empty() || tail.is_empty() {
                Err(ParseError::Usage(usage))
            } else {
                Ok((name.clone(), tail.to_string()))
            }
        };
        let mutate = |name: String, mutation: RouteMutation| -> Result<Self, ParseError> {
            Ok(Self::Mutate { name, mutation })
        };

        match command.as_str() {
            "start" => Ok(Self::Start),
            "commands" | "help" => Ok(Self::Help),
            "status" => Ok(Self::Status),
            "monitor" => Ok(Self::Monitor),
            "listpairs" => Ok(Self::ListPairs),
            "clearpairs" => Ok(Self::ClearPairs),
            "setpair" => {
                const USAGE: &str = "/setpair <name> <source> <dest> [yes|no]";
                let (source, tail) = next_word(tail);
                let (destination, tail) = next_word(tail);
                let (flag, _) = next_word(tail);
                let (Ok(source), Ok(destination)) = (source.parse(), destination.parse()) else {
                    return Err(ParseError::Usage(USAGE));
                };
                if name.is_empty() {
                    return Err(ParseError::Usage(USAGE));
                }
                Ok(Self::SetPair {
                    name,
                    source,
                    destination,
                    remove_mentions: flag.eq_ignore_ascii_case("yes"),
                })
            },
            "pausepair" => mutate(need_name("/pausepair <name>")?, RouteMutation::SetActive(false)),
            "startpair" => mutate(need_name("/startpair <name>")?, RouteMutation::SetActive(true)),
            "togglementions" => mutate(
                need_name("/togglementions <name>")?,
                RouteMutation::ToggleRemoveMentions,
            ),
            "addblacklist" => {
                let (name, list) = need_text("/addblacklist <name> <word1,word2,...>")?;
                mutate(name, RouteMutation::AddBlacklistWords(split_list(&list)))
            },
            "clearblacklist" => mutate(need_name("/clearblacklist <name>")?, RouteMutation::ClearBlacklist),
            "toggleurlblock" => mutate(need_name("/toggleurlblock <name>")?, RouteMutation::ToggleBlockUrls),
            "addurlblacklist" => {
                let (name, list) = need_text("/addurlblacklist <name> <url1,url2,...>")?;
                mutate(name, RouteMutation::AddUrlBlacklist(split_list(&list)))
            },
            "clearurlblacklist" => mutate(
                need_name("/clearurlblacklist <name>")?,
                RouteMutation::ClearUrlBlacklist,
            ),
            "setheader" => {
                let (name, text) = need_text("/setheader <name> <text>")?;
                mutate(name, RouteMutation::SetHeaderPattern(text))
            },
            "setfooter" => {
                let (name, text) = need_text("/setfooter <name> <text>")?;
                mutate(name, RouteMutation::SetFooterPattern(text))
            },
            "clearheaderfooter" => mutate(
                need_name("/clearheaderfooter <name>")?,
                RouteMutation::ClearHeaderFooter,
            ),
            "setcustomheader" => {
                let (name, text) = need_text("/setcustomheader <name> <text>")?;
                mutate(name, RouteMutation::SetCustomHeader(text))
            },
            "setcustomfooter" => {
                let (name, text) = need_text("/setcustomfooter <name> <text>")?;
                mutate(name, RouteMutation::SetCustomFooter(text))
            },
            "clearcustomheaderfooter" => mutate(
                need_name("/clearcustomheaderfooter <name>")?,
                RouteMutation::ClearCustomHeaderFooter,
            ),
            "blocksentence" => {
                let (name, text) = need_text("/blocksentence <name> <sentence>")?;
                mutate(name, RouteMutation::AddBlockedSentence(text))
            },
            "clearblocksentences" => mutate(
                need_name("/clearblocksentences <name>")?,
                RouteMutation::ClearBlockedSentences,
            ),
            "clearblockedimages" => mutate(
                need_name("/clearblockedimages <name>")?,
                RouteMutation::ClearBlockedImages,
            ),
            "showblacklist" => Ok(Self::Show {
                name: need_name("/showblacklist <name>")?,
                listing: Listing::Blacklist,
            }),
            "showblocksentences" => Ok(Self::Show {
                name: need_name("/showblocksentences <name>")?,
                listing: Listing::BlockedSentences,
            }),
            "showblockedimages" => Ok(Self::Show {
                name: need_name("/showblockedimages <name>")?,
                listing: Listing::BlockedImages,
            }),
            "blockimage" => Ok(Self::BlockImage {
                name: need_name("/blockimage <name>")?,
            }),
            _ => Err(ParseError::Unknown),
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

/// Confirmation for an applied mutation.
fn confirm(mutation: &RouteMutation, entry: &RouteEntry) -> String {
    let name = &entry.key.name;
    let f = &entry.route.filters;
    match mutation {
        RouteMutation::SetActive(false) => format!("Pair '{name}' paused."),
        RouteMutation::SetActive(true) => format!("Pair '{name}' started."),
        RouteMutation::ToggleRemoveMentions => {
            format!("Mentions removal for '{name}' set to {}.", on_off(f.remove_mentions))
        },
        RouteMutation::AddBlacklistWords(words) => {
            format!("Added {} words to blacklist for '{name}'.", words.len())
        },
        RouteMutation::ClearBlacklist => format!("Blacklist cleared for '{name}'."),
        RouteMutation::ToggleBlockUrls => {
            format!("URL blocking for '{name}' set to {}.", on_off(f.block_urls))
        },
        RouteMutation::AddUrlBlacklist(urls) => {
            format!("Added {} URLs to blacklist for '{name}'.", urls.len())
        },
        RouteMutation::ClearUrlBlacklist => format!("URL blacklist cleared for '{name}'."),
        RouteMutation::SetHeaderPattern(text) => format!("Header set for '{name}': {text}"),
        RouteMutation::SetFooterPattern(text) => format!("Footer set for '{name}': {text}"),
        RouteMutation::ClearHeaderFooter => format!("Header and footer cleared for '{name}'."),
        RouteMutation::SetCustomHeader(text) => format!("Custom header set for '{name}': {text}"),
        RouteMutation::SetCustomFooter(text) => format!("Custom footer set for '{name}': {text}"),
        RouteMutation::ClearCustomHeaderFooter => {
            format!("Custom header and footer cleared for '{name}'.")
        },
        RouteMutation::AddBlockedSentence(text) => format!("Sentence blocked for '{name}': {text}"),
        RouteMutation::ClearBlockedSentences => format!("Blocked sentences cleared for '{name}'."),
        RouteMutation::AddBlockedImage(hash) => format!("Image hash {hash} blocked for '{name}'."),
        RouteMutation::ClearBlockedImages => format!("Blocked images cleared for '{name}'."),
    }
}

fn show(listing: Listing, entry: &RouteEntry) -> String {
    let name = &entry.key.name;
    let f = &entry.route.filters;
    let (label, items, sep): (&str, Vec<&str>, &str) = match listing {
        Listing::Blacklist => ("Blacklist", f.blacklist_words.iter().map(String::as_str).collect(), ", "),
        Listing::BlockedSentences => (
            "Blocked sentences",
            f.blocked_sentences.iter().map(String::as_str).collect(),
            "\n",
        ),
        Listing::BlockedImages => (
            "Blocked image hashes",
            f.blocked_image_fingerprints.iter().map(String::as_str).collect(),
            "\n",
        ),
    };
    if items.is_empty() {
        format!("{label} for '{name}' is empty.")
    } else {
        format!("{label} for '{name}':\n{}", items.join(sep))
    }
}

impl Relay {
    /// Execute a command from `owner_id` and send the reply to `chat_id`.
    pub async fn handle_command(
        &self,
        owner_id: OwnerId,
        chat_id: ChatId,
        text: &str,
        replied: Option<&MessageSnapshot>,
    ) {
        let reply = match AdminCommand::parse(text) {
            Ok(command) => {
                debug!(owner_id, ?command, "admin command");
                self.execute(owner_id, command, replied).await
            },
            Err(ParseError::NotACommand) => return,
            Err(e) => e.to_string(),
        };
        self.reply(chat_id, &reply).await;
    }

    /// Run a parsed command and return the reply text.
    pub async fn execute(
        &self,
        owner_id: OwnerId,
        command: AdminCommand,
        replied: Option<&MessageSnapshot>,
    ) -> String {
        match command {
            AdminCommand::Start => "Ferry is running.\nUse /commands for options.".into(),
            AdminCommand::Help => HELP.into(),
            AdminCommand::Status => report::status(
                self.is_connected(),
                self.queue_depth(),
                self.queue_capacity(),
                self.routes.len(),
            ),
            AdminCommand::Monitor => {
                let entries = self.routes.routes_of(owner_id);
                if entries.is_empty() {
                    return NO_PAIRS.into();
                }
                let rows: Vec<_> = entries
                    .iter()
                    .map(|e| (e.as_ref(), self.routes.stats(&e.key).unwrap_or_default()))
                    .collect();
                report::monitor(&rows, self.queue_depth())
            },
            AdminCommand::ListPairs => {
                let entries = self.routes.routes_of(owner_id);
                if entries.is_empty() {
                    return NO_PAIRS.into();
                }
                let refs: Vec<&RouteEntry> = entries.iter().map(AsRef::as_ref).collect();
                report::route_list(&refs)
            },
            AdminCommand::SetPair {
                name,
                source,
                destination,
                remove_mentions,
            } => {
                let mut route = Route::new(source, destination);
                route.filters.remove_mentions = remove_mentions;
                info!(owner_id, name = %name, source, destination, "setting pair");
                match self.routes.upsert(RouteKey::new(owner_id, name), route).await {
                    Ok(entry) => report::route_added(&entry),
                    Err(e) => format!("Could not save pair: {e}"),
                }
            },
            AdminCommand::ClearPairs => match self.routes.clear_owner(owner_id).await {
                0 => "No pairs to clear.".into(),
                _ => "All pairs cleared.".into(),
            },
            AdminCommand::Mutate { name, mutation } => self.apply(owner_id, &name, mutation).await,
            AdminCommand::Show { name, listing } => {
                match self.routes.get(&RouteKey::new(owner_id, name)) {
                    Some(entry) => show(listing, &entry),
                    None => NOT_FOUND.into(),
                }
            },
            AdminCommand::BlockImage { name } => self.block_image(owner_id, &name, replied).await,
        }
    }

    async fn apply(&self, owner_id: OwnerId, name: &str, mutation: RouteMutation) -> String {
        match self.mutate_route(owner_id, name, mutation.clone()).await {
            Ok(entry) => confirm(&mutation, &entry),
            Err(Error::RouteNotFound { .. }) => NOT_FOUND.into(),
            Err(e) => {
                warn!(owner_id, name, error = %e, "route update rejected");
                format!("Could not update pair: {e}")
            },
        }
    }

    async fn block_image(&self, owner_id: OwnerId, name: &str, replied: Option<&MessageSnapshot>) -> String {
        if self.routes.get(&RouteKey::new(owner_id, name)).is_none() {
            return NOT_FOUND.into();
        }
        let Some(replied) = replied else {
            return "Please reply to an image to block it.".into();
        };
        if !replied.media.as_ref().is_some_and(|m| m.kind == MediaKind::Photo) {
            return "Please reply to a photo message.".into();
        }
        let hash = match self.client.download_media(replied).await {
            Ok(bytes) => perceptual_hash(&bytes).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match hash {
            Ok(hash) => {
                info!(owner_id, name, hash = %hash, "blocking image");
                self.apply(owner_id, name, RouteMutation::AddBlockedImage(hash)).await
            },
            Err(e) => {
                warn!(owner_id, name, error = %e, "could not fingerprint image");
                format!("Error blocking image: {e}")
            },
        }
    }

    /// Send a reply, split into numbered parts when it is too long.
    async fn reply(&self, chat_id: ChatId, text: &str) {
        let parts = report::split_reply(text, self.config.max_message_length);
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.chunk_delay()).await;
            }
            if let Err(e) = self.client.send(SendRequest::text(chat_id, part)).await {
                warn!(chat_id, error = %e, "failed to send command reply");
                return;
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("/start", AdminCommand::Start)]
    #[case("/commands", AdminCommand::Help)]
    #[case("/STATUS", AdminCommand::Status)]
    #[case("/monitor@ferry_bot", AdminCommand::Monitor)]
    #[case("/pausepair news", AdminCommand::Mutate {
        name: "news".into(),
        mutation: RouteMutation::SetActive(false),
    })]
    #[case("/addblacklist news spam, ads ,,promo", AdminCommand::Mutate {
        name: "news".into(),
        mutation: RouteMutation::AddBlacklistWords(vec!["spam".into(), "ads".into(), "promo".into()]),
    })]
    #[case("/setfooter news -- sent via   app", AdminCommand::Mutate {
        name: "news".into(),
        mutation: RouteMutation::SetFooterPattern("-- sent via   app".into()),
    })]
    #[case("/blocksentence news buy now", AdminCommand::Mutate {
        name: "news".into(),
        mutation: RouteMutation::AddBlockedSentence("buy now".into()),
    })]
    #[case("/showblockedimages news", AdminCommand::Show {
        name: "news".into(),
        listing: Listing::BlockedImages,
    })]
    fn parses(#[case] text: &str, #[case] expected: AdminCommand) {
        assert_eq!(AdminCommand::parse(text).unwrap(), expected);
    }

    #[rstest]
    #[case("/setpair news -100 -200", false)]
    #[case("/setpair news -100 -200 yes", true)]
    #[case("/setpair news -100 -200 no", false)]
    fn parses_setpair(#[case] text: &str, #[case] remove_mentions: bool) {
        assert_eq!(AdminCommand::parse(text).unwrap(), AdminCommand::SetPair {
            name: "news".into(),
            source: -100,
            destination: -200,
            remove_mentions,
        });
    }

    #[rstest]
    #[case("/setpair news abc -200")]
    #[case("/setpair news")]
    #[case("/setheader news")]
    #[case("/pausepair")]
    fn usage_errors(#[case] text: &str) {
        assert!(matches!(AdminCommand::parse(text), Err(ParseError::Usage(_))));
    }

    #[test]
    fn unknown_and_plain_text() {
        assert_eq!(AdminCommand::parse("/frobnicate"), Err(ParseError::Unknown));
        assert_eq!(AdminCommand::parse("hello"), Err(ParseError::NotACommand));
    }

    #[test]
    fn listing_texts() {
        let mut route = Route::new(1, 2);
        let key = RouteKey::new(1, "news");
        let empty = RouteEntry::build(key.clone(), route.clone()).unwrap();
        assert_eq!(show(Listing::Blacklist, &empty), "Blacklist for 'news' is empty.");

        route.filters.blacklist_words = ["b".to_string(), "a".to_string()].into();
        let entry = RouteEntry::build(key, route).unwrap();
        assert_eq!(show(Listing::Blacklist, &entry), "Blacklist for 'news':\na, b");
    }
}
