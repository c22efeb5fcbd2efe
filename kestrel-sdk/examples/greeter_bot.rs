//! Greeter bot example: joins a channel, greets newcomers, answers
//! CTCP VERSION and a few `!` commands.
//!
//! Usage:
//!   cargo run --example greeter_bot -- --server irc.libera.chat:6697 \
//!     --channel "#kestrel-test"

use anyhow::Result;
use clap::Parser as _;
use kestrel_sdk::client;
use kestrel_sdk::{CommandSink, ConnectConfig, Event, EventKind, Parser};

#[derive(clap::Parser)]
#[command(name = "greeter-bot", about = "kestrel greeter bot example")]
struct Args {
    #[arg(long, default_value = "irc.libera.chat:6697")]
    server: String,
    #[arg(long, default_value = "greeter")]
    nick: String,
    #[arg(long, default_value = "#kestrel-test")]
    channel: String,
    #[arg(long)]
    tls: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut parser = Parser::new(ConnectConfig {
        server_addr: args.server.clone(),
        nick: args.nick.clone(),
        alt_nick: format!("{}_", args.nick),
        realname: "kestrel greeter".to_string(),
        tls: args.tls,
        ..ConnectConfig::default()
    });

    let channel = args.channel.clone();
    parser.on(EventKind::Post005, move |_, ctx| {
        ctx.join_channel(&channel, None)?;
        Ok(())
    });

    parser.on(EventKind::ChannelJoin, |event, ctx| {
        if let Event::ChannelJoin { channel, user } = event {
            let members = ctx.network().channel(channel).map_or(0, |c| c.member_count());
            ctx.send_message(channel, &format!("welcome {}, you make {members}", user.nick))?;
        }
        Ok(())
    });

    parser.on(EventKind::PrivateCtcp, |event, ctx| {
        if let Event::PrivateCtcp { from, kind, .. } = event
            && kind == "VERSION"
        {
            ctx.send_ctcp_reply(&from.nick, "VERSION", concat!("kestrel ", env!("CARGO_PKG_VERSION")))?;
        }
        Ok(())
    });

    parser.on(EventKind::ChannelMessage, |event, ctx| {
        let Event::ChannelMessage { channel, from, text } = event else {
            return Ok(());
        };
        match text.split_whitespace().next() {
            Some("!ops") => {
                let Some(chan) = ctx.network().channel(channel) else {
                    return Ok(());
                };
                let mut ops: Vec<&str> = chan
                    .members
                    .values()
                    .filter(|m| ctx.modes().important_prefix(m.modes) == Some('@'))
                    .map(|m| m.nick.as_str())
                    .collect();
                ops.sort_unstable();
                ctx.send_message(channel, &format!("ops: {}", ops.join(", ")))?;
            }
            Some("!modes") => {
                if let Some(chan) = ctx.network().channel(channel) {
                    ctx.send_notice(&from.nick, &chan.mode_string(ctx.modes()))?;
                }
            }
            _ => {}
        }
        Ok(())
    });

    parser.on(EventKind::ErrorInfo, |event, _| {
        if let Event::ErrorInfo(err) = event {
            tracing::warn!(%err, "parser reported a problem");
        }
        Ok(())
    });

    let (handle, mut task) = client::connect(parser);
    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        joined = &mut task => Some(joined?),
    };
    let parser = match finished {
        Some(parser) => parser,
        None => {
            handle.disconnect(Some("greeter signing off"))?;
            task.await?
        }
    };
    tracing::info!(nick = parser.my_nickname(), "connection ended");
    Ok(())
}
