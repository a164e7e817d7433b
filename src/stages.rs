//! Static catalog of the game's stages.
//!
//! Only the display data lives here. Which keys a stage holds and how they are
//! scored is decided by the service.

/// Display information for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInfo {
    pub number: u32,
    pub name: &'static str,
    pub difficulty: &'static str,
    pub description: &'static str,
}

/// Number of stages the service offers.
pub const STAGE_COUNT: u32 = 5;

const FIRST_STAGE: StageInfo = StageInfo {
    number: 1,
    name: "Social Engineer",
    difficulty: "Easy",
    description: "Convince me to reveal sensitive information through social manipulation.",
};

const STAGES: [StageInfo; STAGE_COUNT as usize] = [
    FIRST_STAGE,
    StageInfo {
        number: 2,
        name: "Code Breaker",
        difficulty: "Medium",
        description: "Break through logical constraints to access restricted data.",
    },
    StageInfo {
        number: 3,
        name: "Logic Hacker",
        difficulty: "Hard",
        description: "Exploit reasoning flaws to bypass security measures.",
    },
    StageInfo {
        number: 4,
        name: "Paranoid Security AI",
        difficulty: "Very Hard",
        description: "Outsmart a highly suspicious and security-focused AI system.",
    },
    StageInfo {
        number: 5,
        name: "Master Vault Guardian",
        difficulty: "Master",
        description: "Defeat the ultimate AI guardian protecting the most sensitive secrets.",
    },
];

/// Looks up a stage by its 1-based number, falling back to stage 1 for
/// anything out of range.
pub fn stage_info(stage: u32) -> StageInfo {
    let idx = usize::try_from(stage.saturating_sub(1)).unwrap_or(0);
    STAGES.get(idx).copied().unwrap_or(FIRST_STAGE)
}

/// Opening transcript line for a stage.
pub fn welcome_text(stage: u32) -> String {
    let info = stage_info(stage);
    format!(
        "Welcome to Tournament Mode!\n\n**{}** - {}\n\n{}\n\n\
         Your mission: Extract the secret key through clever prompt injection techniques. Good luck!",
        info.name, info.difficulty, info.description
    )
}
