use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use checkers_lan::{
    primary_ipv4, NetworkMatch, Role, SessionEvent, SessionHandle, SessionManager, Settings,
};
use checkers_protocol::{GameEvent, Message, Move, Position};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "checkers-lan")]
#[command(about = "Play checkers against another player on the local network")]
struct Cli {
    /// Nickname shown to the opponent (defaults to the saved setting)
    #[arg(short, long)]
    name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host a game and wait for an opponent
    Host {
        /// TCP port to listen on (defaults to the saved setting)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Join a hosted game
    ///
    /// Examples:
    ///   checkers-lan join 192.168.1.20
    ///   checkers-lan join 192.168.1.20:45678
    Join {
        /// Host address, with or without port
        address: String,
    },
    /// List games announced on the local network
    Browse {
        /// How long to listen, in seconds
        #[arg(short, long, default_value_t = 6)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("checkers_lan={}", settings.log_level.directive()).parse()?)
                .add_directive(format!("checkers_protocol={}", settings.log_level.directive()).parse()?),
        )
        .init();

    let cli = Cli::parse();
    let name = cli.name.unwrap_or_else(|| settings.nickname.clone());

    let (session, events) = SessionManager::spawn(settings.session_config());

    match cli.command {
        Commands::Host { port } => {
            let port = port.unwrap_or(settings.game_port);
            let bound = session.host(&name, port).await?;
            info!("Hosting as '{}' at {}:{}, waiting for an opponent", name, primary_ipv4(), bound);
            play(session, events, Role::Host).await
        }
        Commands::Join { address } => {
            let addr = parse_address(&address, settings.game_port)?;
            session.join(&name, addr).await?;
            play(session, events, Role::Client).await
        }
        Commands::Browse { seconds } => browse(session, events, seconds).await,
    }
}

/// 解析 `ip` 或 `ip:port`
fn parse_address(input: &str, default_port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let ip: IpAddr = input
        .parse()
        .with_context(|| format!("invalid address '{}'", input))?;
    Ok(SocketAddr::new(ip, default_port))
}

async fn browse(
    session: SessionHandle,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    seconds: u64,
) -> Result<()> {
    session.start_discovery().await?;
    info!("Listening for games for {} seconds...", seconds);

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(SessionEvent::PeerDiscovered(peer)) => info!("Found '{}' at {}", peer.name, peer.id()),
                Some(SessionEvent::PeerLost(id)) => info!("Game at {} is gone", id),
                Some(_) => {}
                None => break,
            },
        }
    }

    let peers = session.peers().await?;
    if peers.is_empty() {
        println!("No games found.");
    }
    for peer in peers {
        println!("{:<24} {}", peer.name, peer.id());
    }

    session.stop_discovery().await?;
    Ok(())
}

/// 控制台命令
enum Input {
    Move(Move),
    Say(String),
    Reset,
    Board,
    Quit,
}

fn parse_input(line: &str) -> Result<Input> {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

    match command {
        "move" | "m" => {
            let coords: Vec<u8> = rest
                .split_whitespace()
                .map(|part| part.parse::<u8>())
                .collect::<std::result::Result<_, _>>()
                .context("coordinates must be numbers")?;
            let [fx, fy, tx, ty] = coords[..] else {
                bail!("usage: move <from_x> <from_y> <to_x> <to_y>");
            };
            let from = Position::new(fx, fy).context("from square is off the board")?;
            let to = Position::new(tx, ty).context("to square is off the board")?;
            Ok(Input::Move(Move::new(from, to)))
        }
        "say" => Ok(Input::Say(rest.to_string())),
        "reset" => Ok(Input::Reset),
        "board" | "b" => Ok(Input::Board),
        "quit" | "exit" => Ok(Input::Quit),
        other => bail!("unknown command '{}' (move, say, reset, board, quit)", other),
    }
}

async fn send_all(session: &SessionHandle, messages: Vec<Message>) {
    for msg in messages {
        if let Err(e) = session.send(msg).await {
            warn!("Send failed: {}", e);
        }
    }
}

fn print_board(game_match: &NetworkMatch) {
    let game = game_match.game();
    println!("{}", game.board());
    match game.winner() {
        Some(winner) => println!("Game over, {} wins", winner),
        None if game_match.is_my_turn() => println!("Your turn ({})", game.current_turn()),
        None => println!("{} to move", game.current_turn()),
    }
}

async fn play(
    session: SessionHandle,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    role: Role,
) -> Result<()> {
    let mut game_match = NetworkMatch::new(role);
    game_match.game_mut().subscribe(|event| match event {
        GameEvent::PiecesCaptured(captured) => info!("Captured {} piece(s)", captured.len()),
        GameEvent::PieceCrowned(pos) => info!("Piece crowned at {}", pos),
        GameEvent::GameOver(winner) => info!("{} wins!", winner),
        _ => {}
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match &event {
                    SessionEvent::OpponentConnected(name) => info!("Opponent: {}", name),
                    SessionEvent::ChatReceived { from, text } => println!("<{}> {}", from, text),
                    SessionEvent::ConnectionError(reason) => warn!("{}", reason),
                    SessionEvent::OpponentDisconnected => info!("Opponent disconnected"),
                    _ => {}
                }

                let replies = game_match.handle_event(&event);
                send_all(&session, replies).await;

                if matches!(
                    event,
                    SessionEvent::GameStart | SessionEvent::MoveReceived(_) | SessionEvent::GameStateReceived(_)
                ) {
                    print_board(&game_match);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_input(&line) {
                    Ok(Input::Move(mv)) => match game_match.play(&mv) {
                        Ok(msg) => {
                            send_all(&session, vec![msg]).await;
                            print_board(&game_match);
                        }
                        Err(e) => warn!("{}", e),
                    },
                    Ok(Input::Say(text)) => {
                        if let Err(e) = session.send_chat(&text).await {
                            warn!("{}", e);
                        }
                    }
                    Ok(Input::Reset) => {
                        let messages = game_match.new_game();
                        send_all(&session, messages).await;
                        print_board(&game_match);
                    }
                    Ok(Input::Board) => print_board(&game_match),
                    Ok(Input::Quit) => break,
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    session.disconnect().await?;
    Ok(())
}
