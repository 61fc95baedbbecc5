use std::fmt::Write as _;

use anyhow::Result;
use clap::Args;
use dialoguer::console;

use crate::args::BaseArgs;
use crate::config::{Layers, Settings};
use crate::http::ApiClient;
use crate::login::login;
use crate::ui::{apply_column_padding, header, styled_table, with_spinner};

mod api;

pub use api::{get_stats, StatsSummary};

#[derive(Debug, Clone, Args)]
pub struct StatsArgs {}

pub async fn run(base: BaseArgs, _args: StatsArgs) -> Result<()> {
    let settings = Settings::resolve(&base, &Layers::load(), None, None);
    let ctx = login(&base, &settings)?;
    let client = ApiClient::new(&ctx, settings.timeout.value, settings.retries)?;

    let stats = with_spinner("Loading stats...", get_stats(&client)).await?;

    if base.json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!("{}", render(&stats)?);
    }
    Ok(())
}

fn render(stats: &StatsSummary) -> Result<String> {
    let mut output = String::new();
    writeln!(output, "{}\n", console::style("Community archive totals").bold())?;

    let mut table = styled_table();
    table.set_header(vec![header("Metric"), header("Count")]);
    apply_column_padding(&mut table, (0, 6));
    for (label, value) in [
        ("Accounts", stats.account_count),
        ("Tweets", stats.tweet_count),
        ("Liked tweets", stats.liked_tweet_count),
        ("User mentions", stats.user_mentions_count),
    ] {
        table.add_row(vec![label.to_string(), value.to_string()]);
    }
    write!(output, "{table}")?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_every_total() {
        let stats = StatsSummary {
            account_count: 12,
            tweet_count: 3400,
            liked_tweet_count: 560,
            user_mentions_count: 78,
        };
        let output = render(&stats).unwrap();
        for needle in ["Accounts", "12", "Tweets", "3400", "Liked tweets", "560", "78"] {
            assert!(output.contains(needle), "missing {needle} in {output}");
        }
    }
}
