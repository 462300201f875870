/// Vertical border of a cell
pub const VERTICAL: char = '│';
/// Horizontal border of a line
pub const HORIZONTAL: char = '─';

/// Horizontal line of the table
#[derive(Clone, Copy)]
pub enum Position {
    Top,
    Middle,
    Bottom,
}

impl Position {
    /// Left end, column joint and right end of the line
    pub const fn joints(self) -> (char, char, char) {
        match self {
            Self::Top => ('┌', '┬', '┐'),
            Self::Middle => ('├', '┼', '┤'),
            Self::Bottom => ('└', '┴', '┘'),
        }
    }
}

/// One tutor as shown to the user
pub struct TutorCard {
    pub name: String,
    pub subjects: Vec<String>,
    pub schedule: String,
}
