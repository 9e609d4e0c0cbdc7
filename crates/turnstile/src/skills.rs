//! Skills, which are instruction documents the model reads on demand.
//!
//! Each skill lives in its own directory as a `SKILL.md` file starting
//! with a YAML frontmatter:
//!
//! ```markdown
//! ---
//! name: commit-message
//! description: Writes conventional commit messages.
//! triggers:
//!   - commit
//! ---
//!
//! The guide itself.
//! ```

mod library;
mod parser;

pub use library::{Skill, SkillLibrary, render_guidance};
pub use parser::{
    ParsedSkill, SkillError, SkillMetadata, is_valid_skill_name, parse_skill,
};
