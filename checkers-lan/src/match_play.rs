//! 联网对局控制
//!
//! 把会话事件接到 `CheckersGame` 上：对手到达时开局，主机下发初始局面，
//! 收到的走法和快照应用到本地对局。所有方法返回需要发给对方的消息，由调用方发送。

use checkers_protocol::{CheckersGame, ChessError, Message, Move, Side};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::event::{Role, SessionEvent};

/// 一局联网对局
#[derive(Debug)]
pub struct NetworkMatch {
    game: CheckersGame,
    role: Role,
    started: bool,
}

impl NetworkMatch {
    pub fn new(role: Role) -> Self {
        Self {
            game: CheckersGame::new(),
            role,
            started: false,
        }
    }

    pub fn game(&self) -> &CheckersGame {
        &self.game
    }

    /// 可变访问，用于注册监听器
    pub fn game_mut(&mut self) -> &mut CheckersGame {
        &mut self.game
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// 本地执子颜色（主机红，加入方黑）
    pub fn local_side(&self) -> Side {
        self.role.side()
    }

    pub fn is_running(&self) -> bool {
        self.started
    }

    pub fn is_my_turn(&self) -> bool {
        self.started && !self.game.is_game_over() && self.game.current_turn() == self.local_side()
    }

    fn snapshot_message(&self) -> Message {
        Message::GameState(self.game.snapshot())
    }

    /// 开局：重置棋盘，主机下发局面并宣布开始
    fn start(&mut self) -> Vec<Message> {
        self.started = true;
        self.game.reset();
        info!("Match started, playing {}", self.local_side());

        match self.role {
            Role::Host => vec![self.snapshot_message(), Message::GameStart],
            Role::Client => Vec::new(),
        }
    }

    /// 处理会话事件，返回需要发送的消息
    pub fn handle_event(&mut self, event: &SessionEvent) -> Vec<Message> {
        match event {
            SessionEvent::OpponentConnected(name) => {
                if self.started {
                    debug!("Opponent identified as '{}'", name);
                    Vec::new()
                } else {
                    self.start()
                }
            }
            SessionEvent::GameStart => {
                self.started = true;
                Vec::new()
            }
            SessionEvent::MoveReceived(mv) => {
                self.apply_remote_move(mv);
                Vec::new()
            }
            SessionEvent::GameStateReceived(snapshot) => {
                if let Err(e) = self.game.restore(snapshot) {
                    warn!("Ignoring game state: {}", e);
                }
                Vec::new()
            }
            SessionEvent::GameReset => {
                self.game.reset();
                info!("Opponent reset the game");
                match self.role {
                    Role::Host => vec![self.snapshot_message()],
                    Role::Client => Vec::new(),
                }
            }
            SessionEvent::OpponentDisconnected | SessionEvent::Disconnected => {
                if self.started {
                    info!("Match stopped");
                }
                self.started = false;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn apply_remote_move(&mut self, mv: &Move) {
        if !self.started {
            warn!("Ignoring move {} outside a running match", mv);
            return;
        }
        if self.game.current_turn() == self.local_side() {
            warn!("Ignoring move {} during our own turn", mv);
            return;
        }
        match self.game.apply_move(mv) {
            Ok(done) => debug!("Opponent played {}", done),
            Err(e) => warn!("Rejected opponent move {}: {}", mv, e),
        }
    }

    /// 走一步本地棋，成功时返回要发送的 `Move` 消息
    pub fn play(&mut self, mv: &Move) -> Result<Message> {
        if !self.started {
            return Err(SessionError::NoMatch);
        }
        if self.game.current_turn() != self.local_side() {
            return Err(ChessError::NotYourTurn.into());
        }
        let done = self.game.apply_move(mv)?;
        Ok(Message::Move(done))
    }

    /// 本地重新开局，返回 GameReset + GameState
    pub fn new_game(&mut self) -> Vec<Message> {
        self.game.reset();
        vec![Message::GameReset, self.snapshot_message()]
    }
}
