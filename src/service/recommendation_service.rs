use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::Tutor,
    error::Result,
    repository::{BookingRepository, TutorRepository, UserRepository},
};

const RATING_WEIGHT: f64 = 0.3;
const LOCATION_BOOST: f64 = 1.2;

#[derive(Debug, Clone, Serialize)]
pub struct RecommendedTutor {
    pub tutor: Tutor,
    pub score: f64,
}

/// A bookable tutor plus the location of their user account.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub tutor: Tutor,
    pub location: Option<String>,
}

pub struct RecommendationService {
    tutors: Arc<dyn TutorRepository>,
    bookings: Arc<dyn BookingRepository>,
    users: Arc<dyn UserRepository>,
}

impl RecommendationService {
    pub fn new(
        tutors: Arc<dyn TutorRepository>,
        bookings: Arc<dyn BookingRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            tutors,
            bookings,
            users,
        }
    }

    pub async fn recommend_for_student(
        &self,
        student_id: Uuid,
        limit: usize,
    ) -> Result<Vec<RecommendedTutor>> {
        let student = self.users.find_by_id(student_id).await?;
        let subjects: Vec<String> = self
            .bookings
            .find_by_student(student_id)
            .await?
            .into_iter()
            .map(|b| b.subject)
            .collect();

        let mut candidates = Vec::new();
        for tutor in self.tutors.list_bookable().await? {
            let location = self
                .users
                .find_by_id(tutor.user_id)
                .await?
                .and_then(|u| u.location);
            candidates.push(Candidate { tutor, location });
        }

        let location = student.and_then(|s| s.location);
        let mut ranked = rank_tutors(&subjects, location.as_deref(), candidates);
        ranked.truncate(limit);
        Ok(ranked)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// ln(N / df) over the given documents.
fn inverse_document_frequency(documents: &[Vec<String>]) -> HashMap<&str, f64> {
    let mut frequency: HashMap<&str, usize> = HashMap::new();
    for document in documents {
        let unique: HashSet<&str> = document.iter().map(String::as_str).collect();
        for word in unique {
            *frequency.entry(word).or_default() += 1;
        }
    }

    let n = documents.len() as f64;
    frequency
        .into_iter()
        .map(|(word, count)| (word, (n / count as f64).ln()))
        .collect()
}

fn weigh<'a>(document: &'a [String], idf: &HashMap<&str, f64>) -> HashMap<&'a str, f64> {
    let mut vector: HashMap<&str, f64> = HashMap::new();
    for word in document {
        *vector.entry(word.as_str()).or_default() += 1.0;
    }
    for (word, weight) in vector.iter_mut() {
        *weight *= idf.get(*word).copied().unwrap_or(0.0);
    }
    vector
}

fn cosine(a: &HashMap<&str, f64>, b: &HashMap<&str, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(word, x)| b.get(*word).map(|y| x * y))
        .sum();
    let norm = a.values().map(|x| x * x).sum::<f64>().sqrt()
        * b.values().map(|y| y * y).sum::<f64>().sqrt();

    if norm == 0.0 {
        0.0
    } else {
        dot / norm
    }
}

/// Order tutors for a student whose past bookings covered `subjects`.
///
/// Similarity is TF-IDF cosine between the student's subjects and each tutor's
/// `subjects level bio`, scaled by `1 + rating / 5 * 0.3` and by 1.2 when both
/// sides share a location. Without history, tutors are ordered by rating.
pub fn rank_tutors(
    subjects: &[String],
    student_location: Option<&str>,
    candidates: Vec<Candidate>,
) -> Vec<RecommendedTutor> {
    let preferred: HashSet<String> = subjects
        .iter()
        .flat_map(|s| s.split(','))
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    let mut ranked: Vec<RecommendedTutor> = if preferred.is_empty() {
        candidates
            .into_iter()
            .map(|c| RecommendedTutor {
                score: c.tutor.rating,
                tutor: c.tutor,
            })
            .collect()
    } else {
        let mut preferred: Vec<String> = preferred.into_iter().collect();
        preferred.sort();
        let student_doc = tokenize(&preferred.join(" "));
        let tutor_docs: Vec<Vec<String>> = candidates
            .iter()
            .map(|c| tokenize(&format!("{} {} {}", c.tutor.subjects, c.tutor.level, c.tutor.bio)))
            .collect();

        let mut documents = vec![student_doc.clone()];
        documents.extend(tutor_docs.iter().cloned());
        let idf = inverse_document_frequency(&documents);
        let student_vec = weigh(&student_doc, &idf);

        candidates
            .into_iter()
            .zip(tutor_docs.iter())
            .map(|(candidate, doc)| {
                let mut score = cosine(&student_vec, &weigh(doc, &idf));
                score *= 1.0 + candidate.tutor.rating / 5.0 * RATING_WEIGHT;
                if let (Some(mine), Some(theirs)) = (student_location, candidate.location.as_deref()) {
                    if mine.eq_ignore_ascii_case(theirs) {
                        score *= LOCATION_BOOST;
                    }
                }
                RecommendedTutor {
                    tutor: candidate.tutor,
                    score,
                }
            })
            .collect()
    };

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate(name: &str, subjects: &str, rating: f64, location: Option<&str>) -> Candidate {
        let now = Utc::now();
        Candidate {
            tutor: Tutor {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                full_name: name.to_string(),
                subjects: subjects.to_string(),
                level: "secondary".to_string(),
                bio: String::new(),
                hourly_rate_cents: 50_000,
                rating,
                total_ratings: 10,
                completed_sessions: 0,
                is_available: true,
                is_verified: true,
                created_at: now,
                updated_at: now,
            },
            location: location.map(str::to_string),
        }
    }

    fn names(ranked: &[RecommendedTutor]) -> Vec<&str> {
        ranked.iter().map(|r| r.tutor.full_name.as_str()).collect()
    }

    #[test]
    fn test_no_history_ranks_by_rating() {
        let ranked = rank_tutors(
            &[],
            None,
            vec![
                candidate("Amina", "chemistry", 3.5, None),
                candidate("Brian", "physics", 4.9, None),
            ],
        );
        assert_eq!(names(&ranked), vec!["Brian", "Amina"]);
    }

    #[test]
    fn test_subject_overlap_beats_rating() {
        let ranked = rank_tutors(
            &["Mathematics".to_string()],
            None,
            vec![
                candidate("Brian", "physics chemistry", 5.0, None),
                candidate("Amina", "mathematics physics", 3.0, None),
            ],
        );
        assert_eq!(names(&ranked), vec!["Amina", "Brian"]);
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn test_rating_and_location_boosts() {
        let subjects = ["biology".to_string()];
        let score_of_a = |rating: f64, student: Option<&str>, tutor: Option<&str>| {
            rank_tutors(
                &subjects,
                student,
                vec![
                    candidate("A", "biology", rating, tutor),
                    candidate("B", "history", 0.0, None),
                ],
            )
            .into_iter()
            .find(|r| r.tutor.full_name == "A")
            .map(|r| r.score)
            .unwrap()
        };

        let plain = score_of_a(0.0, None, None);
        let rated = score_of_a(5.0, None, None);
        let local = score_of_a(0.0, Some("Nairobi"), Some("nairobi"));

        assert!(plain > 0.0);
        assert!((rated / plain - 1.3).abs() < 1e-9);
        assert!((local / plain - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_of_empty_vectors_is_zero() {
        assert_eq!(cosine(&HashMap::new(), &HashMap::new()), 0.0);
    }
}
