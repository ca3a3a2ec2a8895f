use tracing::info;

use crate::event::ControlCommand;

/// The slice of a video player the relay drives.
pub trait PlayerAdapter: Send {
    fn seek_to(&mut self, seconds: f64, allow_seek_ahead: bool);
    fn play_video(&mut self);
    fn pause_video(&mut self);
    fn load_video_by_id(&mut self, video_id: &str);
    fn get_current_time(&self) -> f64;
}

/// Carries out `command` on `player`. A `PLAY` with a position seeks first.
pub fn drive<P>(player: &mut P, command: &ControlCommand)
where
    P: PlayerAdapter + ?Sized,
{
    match command {
        ControlCommand::Play { current_time } => {
            if let Some(seconds) = current_time {
                player.seek_to(*seconds, true);
            }
            player.play_video();
        }
        ControlCommand::Pause => player.pause_video(),
        ControlCommand::Seek { current_time } => {
            if let Some(seconds) = current_time {
                player.seek_to(*seconds, true);
            }
        }
        ControlCommand::LoadVideo { video_id } => player.load_video_by_id(video_id),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    SeekTo { seconds: f64, allow_seek_ahead: bool },
    Play,
    Pause,
    LoadVideo(String),
}

/// In-memory player that keeps playback state and a log of every call.
#[derive(Debug, Default)]
pub struct SimulatedPlayer {
    video_id: Option<String>,
    position: f64,
    playing: bool,
    calls: Vec<PlayerCall>,
    verbose: bool,
}

impl SimulatedPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(video_id: impl Into<String>) -> Self {
        Self {
            video_id: Some(video_id.into()),
            ..Self::default()
        }
    }

    /// Logs each call at info level.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn calls(&self) -> &[PlayerCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<PlayerCall> {
        std::mem::take(&mut self.calls)
    }

    fn record(&mut self, call: PlayerCall) {
        if self.verbose {
            info!(
                ?call,
                video_id = self.video_id.as_deref().unwrap_or("-"),
                position = self.position,
                playing = self.playing,
                "player"
            );
        }
        self.calls.push(call);
    }
}

impl PlayerAdapter for SimulatedPlayer {
    fn seek_to(&mut self, seconds: f64, allow_seek_ahead: bool) {
        self.position = seconds.max(0.0);
        self.record(PlayerCall::SeekTo {
            seconds,
            allow_seek_ahead,
        });
    }

    fn play_video(&mut self) {
        self.playing = true;
        self.record(PlayerCall::Play);
    }

    fn pause_video(&mut self) {
        self.playing = false;
        self.record(PlayerCall::Pause);
    }

    fn load_video_by_id(&mut self, video_id: &str) {
        self.video_id = Some(video_id.to_string());
        self.position = 0.0;
        self.record(PlayerCall::LoadVideo(video_id.to_string()));
    }

    fn get_current_time(&self) -> f64 {
        self.position
    }
}
