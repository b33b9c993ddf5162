//! Command-line client for the FPL occurrence service.
//!
//! The default `all` command downloads the all-gameweek CSV for a league to
//! `dataFile-<YYYY-MM-DD>-<league>.csv` in the output directory. The other
//! commands print the result of the single-value RPCs.

use anyhow::Context;
use clap::{Parser, Subcommand};
use core::time::Duration;
use fpl_tonic_core::proto::{
    GameweekRequest, LeagueCode, NumPlayersRequest, fpl_client::FplClient,
};
use std::path::{Path, PathBuf};
use tokio::{fs::File, io::AsyncWriteExt};
use tonic::{Request, codec::CompressionEncoding, transport::Channel};

#[derive(Parser, Debug)]
#[command(name = "fpl-tonic-client", about = "Query the FPL occurrence service")]
struct ClientArgs {
    /// Server endpoint
    #[arg(long, env = "FPL_SERVER_URL", default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// Per-call timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the all-gameweek CSV for a league
    All {
        #[arg(short, long, default_value_t = 313)]
        league: i64,

        /// Directory the CSV is written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Print the number of players in the game
    Players,
    /// Print the number of participants in a league
    Participants {
        #[arg(short, long, default_value_t = 313)]
        league: i64,
    },
    /// Print pick counts for a single gameweek
    Gameweek {
        #[arg(short, long, default_value_t = 313)]
        league: i64,

        #[arg(short, long)]
        gameweek: i32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = ClientArgs::parse();

    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let channel = Channel::from_shared(args.addr.clone())
        .with_context(|| format!("invalid server address `{}`", args.addr))?
        .timeout(Duration::from_secs(args.timeout_secs))
        .connect()
        .await
        .with_context(|| format!("cannot connect to {}", args.addr))?;

    let mut client = FplClient::new(channel)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate);

    match args.command {
        Command::All { league, out_dir } => {
            let today = chrono::Local::now().date_naive();
            let path = out_dir.join(format!("dataFile-{}-{}.csv", today.format("%Y-%m-%d"), league));
            let bytes = download(&mut client, league, &path).await?;
            println!("{} ({} bytes)", path.display(), bytes);
        }
        Command::Players => {
            let players = client
                .get_number_of_players(Request::new(NumPlayersRequest {}))
                .await?
                .into_inner();
            println!("There are {} players in FPL", players.num_players);
        }
        Command::Participants { league } => {
            let participants = client
                .get_participants_in_league(Request::new(LeagueCode {
                    league_code: league,
                }))
                .await?
                .into_inner();
            println!(
                "There are {} participants in league {}",
                participants.num_participants, league
            );
        }
        Command::Gameweek { league, gameweek } => {
            let data = client
                .get_data_for_gameweek(Request::new(GameweekRequest {
                    league_code: league,
                    gameweek,
                }))
                .await?
                .into_inner();

            let mut counts: Vec<_> = data.player_occurrence.into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (player, count) in counts {
                println!("{player}: {count}");
            }
            if data.partial {
                eprintln!("warning: some picks could not be fetched, counts are incomplete");
            }
        }
    }

    Ok(())
}

/// Writes every streamed chunk to `path` in order. A failed transfer removes
/// the partial file.
async fn download(
    client: &mut FplClient<Channel>,
    league: i64,
    path: &Path,
) -> anyhow::Result<usize> {
    let mut stream = client
        .get_data_for_all_gameweeks(Request::new(LeagueCode {
            league_code: league,
        }))
        .await
        .context("GetDataForAllGameweeks failed")?
        .into_inner();

    let mut file = File::create(path)
        .await
        .with_context(|| format!("unable to create {}", path.display()))?;

    let transfer = async {
        let mut written = 0;
        while let Some(chunk) = stream.message().await? {
            file.write_all(&chunk.data).await?;
            written += chunk.data.len();
        }
        file.flush().await?;
        anyhow::Ok(written)
    };

    match transfer.await {
        Ok(written) => {
            #[cfg(feature = "tracing")]
            tracing::info!("File transfer complete: {} bytes", written);
            Ok(written)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(path).await;
            Err(e.context("error while receiving the CSV stream"))
        }
    }
}
