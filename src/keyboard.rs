use teloxide::types::{KeyboardButton, KeyboardMarkup};

pub(crate) fn yes_no_keyboard() -> KeyboardMarkup {
    let keyboard: Vec<Vec<KeyboardButton>> =
        vec![vec![KeyboardButton::new("/yes"), KeyboardButton::new("/no")]];

    KeyboardMarkup::new(keyboard)
}

/// One `/A`..`/D` button per option, two per row.
pub(crate) fn answers_keyboard(labels: &[&str]) -> KeyboardMarkup {
    let keyboard: Vec<Vec<KeyboardButton>> = labels
        .chunks(2)
        .map(|row| {
            row.iter()
                .map(|label| KeyboardButton::new(format!("/{label}")))
                .collect()
        })
        .collect();

    KeyboardMarkup::new(keyboard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_are_laid_out_in_pairs() {
        let keyboard = answers_keyboard(&["A", "B", "C"]);
        let rows: Vec<Vec<&str>> = keyboard
            .keyboard
            .iter()
            .map(|row| row.iter().map(|button| button.text.as_str()).collect())
            .collect();
        assert_eq!(rows, vec![vec!["/A", "/B"], vec!["/C"]]);
    }
}
