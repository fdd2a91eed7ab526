//! Size keyword detection in marketplace display names

use crate::core::PizzaSize;

/// First size keyword found in `name`, if any
///
/// Matches whole words only, case-insensitive, with or without accents:
/// "Pizza Broto 2 Sabores" → `Broto`, "Pizza Média" → `Media`,
/// "Brotoleta" → `None`.
pub fn detect_size(name: &str) -> Option<PizzaSize> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .find_map(|word| word.parse::<PizzaSize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_size_keywords() {
        assert_eq!(detect_size("Pizza Broto 2 Sabores"), Some(PizzaSize::Broto));
        assert_eq!(detect_size("PIZZA GRANDE (3 sabores)"), Some(PizzaSize::Grande));
        assert_eq!(detect_size("Pizza Média - meia/meia"), Some(PizzaSize::Media));
        assert_eq!(detect_size("Combo Família"), Some(PizzaSize::Familia));
    }

    #[test]
    fn test_ignores_partial_words() {
        assert_eq!(detect_size("Brotoleta de frango"), None);
        assert_eq!(detect_size("Esfiha"), None);
        assert_eq!(detect_size(""), None);
    }

    #[test]
    fn test_first_keyword_wins() {
        assert_eq!(detect_size("Grande ou broto"), Some(PizzaSize::Grande));
    }
}
