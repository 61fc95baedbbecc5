use serde::{Deserialize, Deserializer, Serialize};

/// Account metadata from the export's `account` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(alias = "accountId")]
    pub account_id: String,
    pub username: String,
    #[serde(alias = "accountDisplayName", default)]
    pub account_display_name: String,
    #[serde(alias = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(alias = "createdVia", default)]
    pub created_via: Option<String>,
    #[serde(alias = "numFollowers", default, deserialize_with = "count")]
    pub num_followers: u64,
    #[serde(alias = "numFollowing", default, deserialize_with = "count")]
    pub num_following: u64,
    #[serde(alias = "numLikes", default, deserialize_with = "count")]
    pub num_likes: u64,
    #[serde(alias = "numTweets", default, deserialize_with = "count")]
    pub num_tweets: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TweetRecord")]
pub struct Tweet {
    pub tweet_id: String,
    pub created_at: Option<String>,
    pub full_text: String,
    pub retweet_count: u64,
    pub favorite_count: u64,
    pub reply_to_tweet_id: Option<String>,
    pub reply_to_user_id: Option<String>,
    pub reply_to_username: Option<String>,
    #[serde(skip_serializing)]
    pub entities: TweetEntities,
}

/// Exports often carry the same id under several keys (`id_str` next to
/// `id`), so each spelling is its own field and the first present one wins.
#[derive(Deserialize)]
struct TweetRecord {
    tweet_id: Option<Id>,
    #[serde(rename = "tweetId")]
    tweet_id_camel: Option<Id>,
    id_str: Option<Id>,
    id: Option<Id>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(alias = "fullText", alias = "text", default)]
    full_text: String,
    #[serde(default, deserialize_with = "count")]
    retweet_count: u64,
    #[serde(default, deserialize_with = "count")]
    favorite_count: u64,
    #[serde(alias = "in_reply_to_status_id_str", default)]
    reply_to_tweet_id: Option<String>,
    #[serde(alias = "in_reply_to_user_id_str", default)]
    reply_to_user_id: Option<String>,
    #[serde(alias = "in_reply_to_screen_name", default)]
    reply_to_username: Option<String>,
    #[serde(default)]
    entities: TweetEntities,
}

impl TryFrom<TweetRecord> for Tweet {
    type Error = String;

    fn try_from(record: TweetRecord) -> Result<Self, Self::Error> {
        let tweet_id = first_id([
            record.tweet_id,
            record.tweet_id_camel,
            record.id_str,
            record.id,
        ])
        .ok_or("missing field `tweet_id`")?;
        Ok(Tweet {
            tweet_id,
            created_at: record.created_at,
            full_text: record.full_text,
            retweet_count: record.retweet_count,
            favorite_count: record.favorite_count,
            reply_to_tweet_id: record.reply_to_tweet_id,
            reply_to_user_id: record.reply_to_user_id,
            reply_to_username: record.reply_to_username,
            entities: record.entities,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TweetEntities {
    #[serde(default)]
    pub user_mentions: Vec<EntityMention>,
}

/// A mention as embedded in a tweet's `entities.user_mentions`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "EntityMentionRecord")]
pub struct EntityMention {
    pub id: String,
    pub name: String,
    pub screen_name: String,
}

#[derive(Deserialize)]
struct EntityMentionRecord {
    id_str: Option<Id>,
    id: Option<Id>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    screen_name: String,
}

impl TryFrom<EntityMentionRecord> for EntityMention {
    type Error = String;

    fn try_from(record: EntityMentionRecord) -> Result<Self, Self::Error> {
        Ok(EntityMention {
            id: first_id([record.id_str, record.id]).ok_or("missing field `id_str`")?,
            name: record.name,
            screen_name: record.screen_name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LikeRecord")]
pub struct Like {
    pub tweet_id: String,
    pub full_text: Option<String>,
}

#[derive(Deserialize)]
struct LikeRecord {
    tweet_id: Option<Id>,
    #[serde(rename = "tweetId")]
    tweet_id_camel: Option<Id>,
    #[serde(alias = "fullText", default)]
    full_text: Option<String>,
}

impl TryFrom<LikeRecord> for Like {
    type Error = String;

    fn try_from(record: LikeRecord) -> Result<Self, Self::Error> {
        Ok(Like {
            tweet_id: first_id([record.tweet_id, record.tweet_id_camel])
                .ok_or("missing field `tweet_id`")?,
            full_text: record.full_text,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MentionRecord")]
pub struct Mention {
    pub tweet_id: String,
    pub mentioned_user_id: String,
    pub screen_name: String,
    pub name: String,
}

#[derive(Deserialize)]
struct MentionRecord {
    tweet_id: Option<Id>,
    #[serde(rename = "tweetId")]
    tweet_id_camel: Option<Id>,
    mentioned_user_id: Option<Id>,
    #[serde(rename = "mentionedUserId")]
    mentioned_user_id_camel: Option<Id>,
    user_id: Option<Id>,
    #[serde(alias = "screenName", default)]
    screen_name: String,
    #[serde(default)]
    name: String,
}

impl TryFrom<MentionRecord> for Mention {
    type Error = String;

    fn try_from(record: MentionRecord) -> Result<Self, Self::Error> {
        Ok(Mention {
            tweet_id: first_id([record.tweet_id, record.tweet_id_camel])
                .ok_or("missing field `tweet_id`")?,
            mentioned_user_id: first_id([
                record.mentioned_user_id,
                record.mentioned_user_id_camel,
                record.user_id,
            ])
            .ok_or("missing field `mentioned_user_id`")?,
            screen_name: record.screen_name,
            name: record.name,
        })
    }
}

/// An id written either as a string or as a bare number.
#[derive(Deserialize)]
#[serde(untagged)]
enum Id {
    Text(String),
    Number(u64),
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        match id {
            Id::Text(text) => text,
            Id::Number(n) => n.to_string(),
        }
    }
}

/// First non-blank id in key-preference order, else the first one present.
fn first_id<const N: usize>(candidates: [Option<Id>; N]) -> Option<String> {
    let mut ids = candidates.into_iter().flatten().map(String::from).peekable();
    let first = ids.peek().cloned();
    ids.find(|id| !id.trim().is_empty()).or(first)
}

/// Exports write counts either as JSON numbers or as decimal strings.
fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    match Count::deserialize(deserializer)? {
        Count::Number(n) => Ok(n),
        Count::Text(s) if s.trim().is_empty() => Ok(0),
        Count::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid count '{s}'"))),
    }
}
