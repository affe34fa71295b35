//! Canonical summary synthesis.
//!
//! `synthesize` turns a structured profile into the single text
//! representation that gets embedded. It is pure and deterministic:
//! identical input must produce byte-identical output, because the sync
//! pipeline uses exact string comparison on the result to decide whether
//! a re-embed is needed.

use crate::profile::Profile;

/// Build the canonical summary for a profile.
///
/// Sections are emitted in a fixed order and only when their source list
/// is non-empty. The final string has consecutive whitespace collapsed
/// and is trimmed.
pub fn synthesize(profile: &Profile) -> String {
    let mut parts: Vec<String> = Vec::new();

    let bio = profile
        .biography
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty());
    match bio {
        Some(bio) => parts.push(format!("{} – {}.", profile.name, bio)),
        None => parts.push(format!("{}.", profile.name)),
    }

    if !profile.skills.is_empty() {
        let skills: Vec<String> = profile
            .skills
            .iter()
            .filter(|s| !s.name.trim().is_empty())
            .map(|s| match &s.proficiency {
                Some(p) => format!("{} ({})", s.name, p),
                None => s.name.clone(),
            })
            .collect();
        if !skills.is_empty() {
            parts.push(format!("Skilled in: {}.", skills.join(", ")));
        }
    }

    if !profile.experience.is_empty() {
        let entries: Vec<String> = profile
            .experience
            .iter()
            .filter(|e| e.title.is_some() || e.company.is_some())
            .map(|e| {
                let mut piece = format!(
                    "{} at {}",
                    e.title.as_deref().unwrap_or(""),
                    e.company.as_deref().unwrap_or("")
                );
                if let Some(years) = e.years {
                    let unit = if years == 1 { "yr" } else { "yrs" };
                    piece.push_str(&format!(" ({} {})", years, unit));
                }
                piece.trim().to_string()
            })
            .collect();
        if !entries.is_empty() {
            parts.push(format!("Experience: {}.", entries.join("; ")));
        }
    }

    if !profile.languages.is_empty() {
        parts.push(format!("Languages: {}.", profile.languages.join(", ")));
    }

    if !profile.education.is_empty() {
        let entries: Vec<String> = profile
            .education
            .iter()
            .filter_map(|e| {
                let program = e.program.as_deref()?.trim();
                if program.is_empty() {
                    return None;
                }
                Some(match &e.level {
                    Some(level) => format!("{} ({})", program, level),
                    None => program.to_string(),
                })
            })
            .collect();
        if !entries.is_empty() {
            parts.push(format!("Education: {}.", entries.join("; ")));
        }
    }

    // collapse runs of whitespace and trim
    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Education, Experience, Profile, Skill};

    fn full_profile() -> Profile {
        Profile {
            id: 1,
            name: "Ada Lovelace".to_string(),
            biography: Some("Analytical engine programmer".to_string()),
            skills: vec![
                Skill {
                    name: "Mathematics".to_string(),
                    proficiency: Some("Expert".to_string()),
                },
                Skill {
                    name: "Poetry".to_string(),
                    proficiency: None,
                },
            ],
            experience: vec![
                Experience {
                    company: Some("Babbage & Co".to_string()),
                    title: Some("Programmer".to_string()),
                    years: Some(7),
                },
                Experience {
                    company: None,
                    title: Some("Translator".to_string()),
                    years: Some(1),
                },
            ],
            education: vec![Education {
                program: Some("Mathematics".to_string()),
                level: Some("Private tuition".to_string()),
            }],
            languages: vec!["English".to_string(), "French".to_string()],
            years_of_experience: 8,
        }
    }

    #[test]
    fn full_profile_renders_all_sections() {
        let summary = synthesize(&full_profile());
        assert_eq!(
            summary,
            "Ada Lovelace – Analytical engine programmer. \
             Skilled in: Mathematics (Expert), Poetry. \
             Experience: Programmer at Babbage & Co (7 yrs); Translator at (1 yr). \
             Languages: English, French. \
             Education: Mathematics (Private tuition)."
        );
    }

    #[test]
    fn deterministic() {
        let profile = full_profile();
        assert_eq!(synthesize(&profile), synthesize(&profile));
    }

    #[test]
    fn bare_profile_is_name_and_bio_only() {
        let mut profile = Profile::bare(2, "Grace Hopper");
        profile.biography = Some("Compiler pioneer".to_string());
        assert_eq!(synthesize(&profile), "Grace Hopper – Compiler pioneer.");
    }

    #[test]
    fn empty_biography_omits_dash_clause() {
        let profile = Profile::bare(3, "Alan Turing");
        assert_eq!(synthesize(&profile), "Alan Turing.");

        let mut profile = Profile::bare(3, "Alan Turing");
        profile.biography = Some("   ".to_string());
        assert_eq!(synthesize(&profile), "Alan Turing.");
    }

    #[test]
    fn unnamed_skills_are_skipped() {
        let mut profile = Profile::bare(4, "X");
        profile.skills = vec![
            Skill {
                name: "  ".to_string(),
                proficiency: Some("Expert".to_string()),
            },
            Skill {
                name: "Rust".to_string(),
                proficiency: None,
            },
        ];
        assert_eq!(synthesize(&profile), "X. Skilled in: Rust.");
    }

    #[test]
    fn experience_requires_title_or_company() {
        let mut profile = Profile::bare(5, "X");
        profile.experience = vec![
            Experience {
                company: None,
                title: None,
                years: Some(3),
            },
            Experience {
                company: Some("Acme".to_string()),
                title: None,
                years: None,
            },
        ];
        assert_eq!(synthesize(&profile), "X. Experience: at Acme.");
    }

    #[test]
    fn education_requires_program() {
        let mut profile = Profile::bare(6, "X");
        profile.education = vec![
            Education {
                program: None,
                level: Some("BSc".to_string()),
            },
            Education {
                program: Some("Physics".to_string()),
                level: None,
            },
        ];
        assert_eq!(synthesize(&profile), "X. Education: Physics.");
    }

    #[test]
    fn whitespace_is_collapsed() {
        let mut profile = Profile::bare(7, "A  B");
        profile.biography = Some("line one\n\nline two".to_string());
        assert_eq!(synthesize(&profile), "A B – line one line two.");
    }
}
