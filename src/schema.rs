//! Backend table, view and routine names, and the rows written to them.
//!
//! Everything that depends on the remote schema's shape lives here.

use serde::Serialize;

use crate::archive::{Account, Like, Mention, Tweet};

pub const ACCOUNT_TABLE: &str = "account";
pub const TWEETS_TABLE: &str = "tweets";
pub const LIKED_TWEETS_TABLE: &str = "liked_tweets";
pub const LIKES_TABLE: &str = "likes";
pub const MENTIONED_USERS_TABLE: &str = "mentioned_users";
pub const USER_MENTIONS_TABLE: &str = "user_mentions";

pub const ACCOUNT_KEY: &[&str] = &["account_id"];
pub const TWEETS_KEY: &[&str] = &["tweet_id"];
pub const LIKED_TWEETS_KEY: &[&str] = &["tweet_id"];
pub const LIKES_KEY: &[&str] = &["account_id", "liked_tweet_id"];
pub const MENTIONED_USERS_KEY: &[&str] = &["user_id"];
pub const USER_MENTIONS_KEY: &[&str] = &["mentioned_user_id", "tweet_id"];

/// Registers an upload with its record counts.
pub const RECORD_UPLOAD_RPC: &str = "record_archive_upload";

pub const STATS_VIEW: &str = "global_activity_summary";

/// Fields of [`crate::stats::StatsSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsField {
    AccountCount,
    TweetCount,
    LikedTweetCount,
    UserMentionsCount,
}

/// Backend column for each summary field. Renames on the backend only touch this table.
pub const STATS_COLUMNS: &[(&str, StatsField)] = &[
    ("total_accounts", StatsField::AccountCount),
    ("total_tweets", StatsField::TweetCount),
    ("total_likes", StatsField::LikedTweetCount),
    ("total_user_mentions", StatsField::UserMentionsCount),
];

pub fn stats_column_names() -> Vec<&'static str> {
    STATS_COLUMNS.iter().map(|(column, _)| *column).collect()
}

#[derive(Debug, Serialize)]
pub struct AccountRow<'a> {
    pub account_id: &'a str,
    pub username: &'a str,
    pub account_display_name: &'a str,
    pub created_at: Option<&'a str>,
    pub created_via: Option<&'a str>,
    pub num_followers: u64,
    pub num_following: u64,
    pub num_likes: u64,
    pub num_tweets: u64,
}

impl<'a> From<&'a Account> for AccountRow<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            account_id: &account.account_id,
            username: &account.username,
            account_display_name: &account.account_display_name,
            created_at: account.created_at.as_deref(),
            created_via: account.created_via.as_deref(),
            num_followers: account.num_followers,
            num_following: account.num_following,
            num_likes: account.num_likes,
            num_tweets: account.num_tweets,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TweetRow<'a> {
    pub tweet_id: &'a str,
    pub account_id: &'a str,
    pub created_at: Option<&'a str>,
    pub full_text: &'a str,
    pub retweet_count: u64,
    pub favorite_count: u64,
    pub reply_to_tweet_id: Option<&'a str>,
    pub reply_to_user_id: Option<&'a str>,
    pub reply_to_username: Option<&'a str>,
}

impl<'a> TweetRow<'a> {
    pub fn new(account_id: &'a str, tweet: &'a Tweet) -> Self {
        Self {
            tweet_id: &tweet.tweet_id,
            account_id,
            created_at: tweet.created_at.as_deref(),
            full_text: &tweet.full_text,
            retweet_count: tweet.retweet_count,
            favorite_count: tweet.favorite_count,
            reply_to_tweet_id: tweet.reply_to_tweet_id.as_deref(),
            reply_to_user_id: tweet.reply_to_user_id.as_deref(),
            reply_to_username: tweet.reply_to_username.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LikedTweetRow<'a> {
    pub tweet_id: &'a str,
    pub full_text: Option<&'a str>,
}

impl<'a> From<&'a Like> for LikedTweetRow<'a> {
    fn from(like: &'a Like) -> Self {
        Self {
            tweet_id: &like.tweet_id,
            full_text: like.full_text.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LikeRow<'a> {
    pub account_id: &'a str,
    pub liked_tweet_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct MentionedUserRow<'a> {
    pub user_id: &'a str,
    pub name: &'a str,
    pub screen_name: &'a str,
}

impl<'a> From<&'a Mention> for MentionedUserRow<'a> {
    fn from(mention: &'a Mention) -> Self {
        Self {
            user_id: &mention.mentioned_user_id,
            name: &mention.name,
            screen_name: &mention.screen_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserMentionRow<'a> {
    pub mentioned_user_id: &'a str,
    pub tweet_id: &'a str,
}

impl<'a> From<&'a Mention> for UserMentionRow<'a> {
    fn from(mention: &'a Mention) -> Self {
        Self {
            mentioned_user_id: &mention.mentioned_user_id,
            tweet_id: &mention.tweet_id,
        }
    }
}
