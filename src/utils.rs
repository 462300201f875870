use std::fmt::Write;

use crate::{
    acuity::{models::Calendar, schedule_url},
    courses::CourseMap,
};
use models::{Position, TutorCard, HORIZONTAL, VERTICAL};

pub mod models;

/// User-Agent sent with every request
pub fn user_agent() -> String {
    format!("tutorcal/{}", env!("CARGO_PKG_VERSION"))
}

/// Draw a separation line of the table
pub fn line_table(widths: &[usize], pos: Position) -> String {
    let (left, joint, right) = pos.joints();

    let cells: Vec<String> = widths
        .iter()
        .map(|width| HORIZONTAL.to_string().repeat(width + 2))
        .collect();

    format!("{left}{}{right}", cells.join(&joint.to_string()))
}

/// Draw a full table, the first row is the header
pub fn table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|i| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let sep = VERTICAL;
    let mut out = line_table(&widths, Position::Top);

    for (i, row) in rows.iter().enumerate() {
        out.push('\n');
        out.push(sep);
        for (j, width) in widths.iter().enumerate() {
            let cell = row.get(j).map_or("", String::as_str);
            let _ = write!(out, " {cell:<width$} {sep}");
        }

        // Separate the header from the rest
        if i == 0 && rows.len() > 1 {
            out.push('\n');
            out.push_str(&line_table(&widths, Position::Middle));
        }
    }

    out.push('\n');
    out.push_str(&line_table(&widths, Position::Bottom));
    out
}

/// Courses with the amount of tutors assigned
pub fn display_courses(map: &CourseMap) -> String {
    if !map.has_courses() {
        return "Add a course to begin.".to_owned();
    }

    let mut rows = vec![vec!["Course".to_owned(), "Tutors".to_owned()]];
    rows.extend(map.sorted_names().into_iter().map(|name| {
        let ids: Vec<String> = map.tutors_for(name).iter().map(ToString::to_string).collect();
        let tutors = if ids.is_empty() {
            "none".to_owned()
        } else {
            format!("{} ({})", ids.len(), ids.join(", "))
        };
        vec![name.to_owned(), tutors]
    }));

    table(&rows)
}

/// Build the cards of the tutors to show
pub fn tutor_cards(calendars: &[Calendar], map: &CourseMap, owner: &str) -> Vec<TutorCard> {
    let subjects = map.tutor_subjects();

    calendars
        .iter()
        .map(|calendar| TutorCard {
            name: calendar.name.clone(),
            subjects: subjects.get(&calendar.id).cloned().unwrap_or_default(),
            schedule: schedule_url(owner, calendar.id),
        })
        .collect()
}

pub fn display_tutors(cards: &[TutorCard]) -> String {
    if cards.is_empty() {
        return "No tutors found.".to_owned();
    }

    let mut rows = vec![vec![
        "Tutor".to_owned(),
        "Subjects".to_owned(),
        "Schedule".to_owned(),
    ]];
    rows.extend(cards.iter().map(|card| {
        let subjects = if card.subjects.is_empty() {
            "No subjects assigned yet.".to_owned()
        } else {
            card.subjects.join(", ")
        };
        vec![card.name.clone(), subjects, card.schedule.clone()]
    }));

    table(&rows)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::courses::models::{AssignmentMap, TutorId};

    #[test]
    fn table_pads_cells_to_widest() {
        let rendered = table(&[
            vec!["Course".into(), "Tutors".into()],
            vec!["Mathématiques".into(), "2".into()],
        ]);

        assert_eq!(
            rendered,
            [
                "┌───────────────┬────────┐",
                "│ Course        │ Tutors │",
                "├───────────────┼────────┤",
                "│ Mathématiques │ 2      │",
                "└───────────────┴────────┘",
            ]
            .join("\n")
        );
    }

    #[test]
    fn lines_use_the_joints_of_their_position() {
        assert_eq!(line_table(&[1, 3], Position::Top), "┌───┬─────┐");
        assert_eq!(line_table(&[1, 3], Position::Middle), "├───┼─────┤");
        assert_eq!(line_table(&[2], Position::Bottom), "└────┘");
    }

    #[test]
    fn empty_map_asks_for_a_course() {
        assert_eq!(
            display_courses(&CourseMap::new(AssignmentMap::new())),
            "Add a course to begin."
        );
    }

    #[test]
    fn cards_show_subjects_or_placeholder() {
        let map = CourseMap::from_value(&json!({ "Math": [1], "Art": [1] }), AssignmentMap::new());
        let calendars = [
            Calendar {
                id: TutorId::from(1),
                name: "Ada".into(),
            },
            Calendar {
                id: TutorId::from(2),
                name: "Alan".into(),
            },
        ];

        let cards = tutor_cards(&calendars, &map, "99");
        assert_eq!(cards[0].subjects, vec!["Art", "Math"]);
        assert!(cards[1].subjects.is_empty());

        let rendered = display_tutors(&cards);
        assert!(rendered.contains("Art, Math"));
        assert!(rendered.contains("No subjects assigned yet."));
        assert!(rendered.contains("owner=99&calendarID=2"));
        assert_eq!(display_tutors(&[]), "No tutors found.");
    }
}
