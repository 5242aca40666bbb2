//! Match scoring of a job posting against a search profile.
//!
//! The score is a weighted 0-100 sum of four components: title, skills,
//! location/remote fit and salary. A preference the user left empty scores
//! full marks for its component; an unknown job attribute scores half. Any
//! excluded keyword forces the total to zero.

use serde::{Deserialize, Serialize};

use crate::common::utils::{contains_phrase, extract_keywords, tokenize, COMMON_SKILLS};
use crate::domains::jobs::models::JobPosting;
use crate::domains::profiles::{Profile, RemotePreference};
use crate::domains::resumes::Resume;
use crate::kernel::ExtractedJob;

pub const TITLE_WEIGHT: i32 = 30;
pub const SKILLS_WEIGHT: i32 = 35;
pub const LOCATION_WEIGHT: i32 = 15;
pub const SALARY_WEIGHT: i32 = 20;

/// Preferences scoring needs, merged from the profile and primary resume.
#[derive(Debug, Clone, Default)]
pub struct ScoringProfile {
    pub target_titles: Vec<String>,
    pub skills: Vec<String>,
    pub preferred_locations: Vec<String>,
    pub remote_preference: RemotePreference,
    pub min_salary: Option<i32>,
    pub excluded_keywords: Vec<String>,
}

impl ScoringProfile {
    /// Profile skills plus skills found in the primary resume.
    pub fn build(profile: &Profile, resume: Option<&Resume>) -> Self {
        let mut skills: Vec<String> = profile.skills.iter().map(|s| s.to_lowercase()).collect();

        if let Some(resume) = resume {
            let vocabulary = profile
                .skills
                .iter()
                .map(String::as_str)
                .chain(COMMON_SKILLS.iter().copied());
            for keyword in extract_keywords(&resume.content, vocabulary) {
                if !skills.contains(&keyword) {
                    skills.push(keyword);
                }
            }
        }

        Self {
            target_titles: profile.target_titles.clone(),
            skills,
            preferred_locations: profile.preferred_locations.clone(),
            remote_preference: profile.remote_preference,
            min_salary: profile.min_salary,
            excluded_keywords: profile.excluded_keywords.clone(),
        }
    }
}

/// The posting attributes scoring looks at.
#[derive(Debug, Clone, Copy)]
pub struct JobFacts<'a> {
    pub title: &'a str,
    pub company: &'a str,
    pub location: Option<&'a str>,
    pub remote: bool,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub description: &'a str,
}

impl<'a> From<&'a JobPosting> for JobFacts<'a> {
    fn from(job: &'a JobPosting) -> Self {
        Self {
            title: &job.title,
            company: &job.company,
            location: job.location.as_deref(),
            remote: job.remote,
            salary_min: job.salary_min,
            salary_max: job.salary_max,
            description: &job.description,
        }
    }
}

impl<'a> From<&'a ExtractedJob> for JobFacts<'a> {
    fn from(job: &'a ExtractedJob) -> Self {
        Self {
            title: &job.title,
            company: &job.company,
            location: job.location.as_deref(),
            remote: job.remote,
            salary_min: job.salary_min,
            salary_max: job.salary_max,
            description: &job.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: i32,
    pub title: i32,
    pub skills: i32,
    pub location: i32,
    pub salary: i32,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    /// Excluded keywords found in the posting. Non-empty means total is 0.
    pub excluded_by: Vec<String>,
}

fn weighted(weight: i32, fraction: f64) -> i32 {
    (f64::from(weight) * fraction.clamp(0.0, 1.0)).round() as i32
}

fn title_score(profile: &ScoringProfile, title_tokens: &[String]) -> i32 {
    if profile.target_titles.is_empty() {
        return TITLE_WEIGHT;
    }

    let best = profile
        .target_titles
        .iter()
        .map(|target| {
            if contains_phrase(title_tokens, target) {
                return 1.0;
            }
            let wanted = tokenize(target);
            if wanted.is_empty() {
                return 0.0;
            }
            let hits = wanted.iter().filter(|t| title_tokens.contains(t)).count();
            hits as f64 / wanted.len() as f64
        })
        .fold(0.0_f64, f64::max);

    weighted(TITLE_WEIGHT, best)
}

fn location_score(profile: &ScoringProfile, job: &JobFacts<'_>) -> i32 {
    let location_tokens = job.location.map(tokenize).unwrap_or_default();
    let location_matches = || {
        profile.preferred_locations.is_empty()
            || profile
                .preferred_locations
                .iter()
                .any(|loc| contains_phrase(&location_tokens, loc))
    };
    let unknown = job.location.is_none() && !job.remote;
    let half = LOCATION_WEIGHT / 2;

    match profile.remote_preference {
        RemotePreference::RemoteOnly => {
            if job.remote {
                LOCATION_WEIGHT
            } else if unknown {
                half
            } else {
                0
            }
        }
        RemotePreference::Onsite => {
            if unknown {
                half
            } else if job.location.is_some() && location_matches() {
                LOCATION_WEIGHT
            } else if job.remote {
                LOCATION_WEIGHT / 3
            } else {
                0
            }
        }
        RemotePreference::Hybrid | RemotePreference::Any => {
            if job.remote || (job.location.is_some() && location_matches()) {
                LOCATION_WEIGHT
            } else if unknown {
                half
            } else {
                0
            }
        }
    }
}

fn salary_score(profile: &ScoringProfile, job: &JobFacts<'_>) -> i32 {
    let Some(wanted) = profile.min_salary.filter(|s| *s > 0) else {
        return SALARY_WEIGHT;
    };
    match job.salary_max.or(job.salary_min) {
        None => SALARY_WEIGHT / 2,
        Some(offered) if offered >= wanted => SALARY_WEIGHT,
        Some(offered) => weighted(SALARY_WEIGHT, f64::from(offered.max(0)) / f64::from(wanted)),
    }
}

/// Score a posting against a profile.
pub fn score_job(profile: &ScoringProfile, job: &JobFacts<'_>) -> ScoreBreakdown {
    let title_tokens = tokenize(job.title);
    let text_tokens = tokenize(&format!("{} {}", job.title, job.description));

    let (matched_skills, missing_skills): (Vec<String>, Vec<String>) = profile
        .skills
        .iter()
        .map(|s| s.to_lowercase())
        .partition(|skill| contains_phrase(&text_tokens, skill));

    let skills = if profile.skills.is_empty() {
        SKILLS_WEIGHT
    } else {
        weighted(
            SKILLS_WEIGHT,
            matched_skills.len() as f64 / profile.skills.len() as f64,
        )
    };

    let title = title_score(profile, &title_tokens);
    let location = location_score(profile, job);
    let salary = salary_score(profile, job);

    let exclusion_tokens = tokenize(&format!(
        "{} {} {}",
        job.title, job.company, job.description
    ));
    let excluded_by: Vec<String> = profile
        .excluded_keywords
        .iter()
        .filter(|kw| contains_phrase(&exclusion_tokens, kw))
        .map(|kw| kw.to_lowercase())
        .collect();

    let total = if excluded_by.is_empty() {
        (title + skills + location + salary).clamp(0, 100)
    } else {
        0
    };

    ScoreBreakdown {
        total,
        title,
        skills,
        location,
        salary,
        matched_skills,
        missing_skills,
        excluded_by,
    }
}
