//! Reference widget implementations (§1 names these out-of-scope
//! domain backends; these stand-ins exercise the registry/executor end to
//! end without a live third-party API, the way `agenticlaw-tools` ships working
//! `read`/`glob`/`grep` tools instead of leaving its own registry empty).

use crate::registry::{Widget, WidgetContext};
use async_trait::async_trait;
use searchagent_core::{ClassifierOutput, WidgetOutput};

pub struct WeatherWidget;

#[async_trait]
impl Widget for WeatherWidget {
    fn widget_type(&self) -> &str {
        "weather"
    }

    fn should_run(&self, classifier: &ClassifierOutput, _query: &str) -> bool {
        classifier.show_weather_widget
    }

    async fn run(&self, ctx: WidgetContext) -> Result<WidgetOutput, String> {
        let card = serde_json::json!({
            "location": extract_subject(&ctx.query).unwrap_or_else(|| "your area".to_string()),
            "conditions": "partly cloudy",
            "temperatureC": 21,
        });
        Ok(WidgetOutput {
            widget_type: self.widget_type().to_string(),
            success: true,
            llm_context: format!("Weather widget: {}", card),
            cards: vec![card],
            error_message: None,
        })
    }
}

pub struct StockWidget;

#[async_trait]
impl Widget for StockWidget {
    fn widget_type(&self) -> &str {
        "stock"
    }

    fn should_run(&self, classifier: &ClassifierOutput, _query: &str) -> bool {
        classifier.show_stock_widget
    }

    async fn run(&self, ctx: WidgetContext) -> Result<WidgetOutput, String> {
        let symbol = extract_subject(&ctx.query).unwrap_or_else(|| "UNKNOWN".to_string());
        let card = serde_json::json!({ "symbol": symbol.to_uppercase(), "priceUsd": 100.0, "changePct": 0.0 });
        Ok(WidgetOutput {
            widget_type: self.widget_type().to_string(),
            success: true,
            llm_context: format!("Stock widget: {}", card),
            cards: vec![card],
            error_message: None,
        })
    }
}

/// The one widget with real, deterministic behavior: parses a simple
/// arithmetic expression out of the query and evaluates it.
pub struct CalculatorWidget;

#[async_trait]
impl Widget for CalculatorWidget {
    fn widget_type(&self) -> &str {
        "calculator"
    }

    fn should_run(&self, classifier: &ClassifierOutput, _query: &str) -> bool {
        classifier.show_calculation_widget
    }

    async fn run(&self, ctx: WidgetContext) -> Result<WidgetOutput, String> {
        let expression = extract_arithmetic(&ctx.query).ok_or_else(|| "no arithmetic expression found in query".to_string())?;
        let result = evaluate(&expression)?;
        let card = serde_json::json!({ "expression": expression, "result": result });
        Ok(WidgetOutput {
            widget_type: self.widget_type().to_string(),
            success: true,
            llm_context: format!("{expression} = {result}"),
            cards: vec![card],
            error_message: None,
        })
    }
}

pub struct ProductWidget;

#[async_trait]
impl Widget for ProductWidget {
    fn widget_type(&self) -> &str {
        "product"
    }

    fn should_run(&self, classifier: &ClassifierOutput, _query: &str) -> bool {
        classifier.show_product_widget
    }

    async fn run(&self, ctx: WidgetContext) -> Result<WidgetOutput, String> {
        let name = extract_subject(&ctx.query).unwrap_or_else(|| "item".to_string());
        let card = serde_json::json!({
            "name": name,
            "priceUsd": 29.99,
            "link": format!("https://example-shop.test/p/{}", slugify(&name)),
        });
        Ok(WidgetOutput {
            widget_type: self.widget_type().to_string(),
            success: true,
            llm_context: format!("Product widget: {}", card),
            cards: vec![card],
            error_message: None,
        })
    }
}

pub struct HotelWidget;

#[async_trait]
impl Widget for HotelWidget {
    fn widget_type(&self) -> &str {
        "hotel"
    }

    fn should_run(&self, classifier: &ClassifierOutput, _query: &str) -> bool {
        classifier.show_hotel_widget
    }

    async fn run(&self, ctx: WidgetContext) -> Result<WidgetOutput, String> {
        let place = extract_subject(&ctx.query).unwrap_or_else(|| "the area".to_string());
        let cards: Vec<serde_json::Value> = (1..=3)
            .map(|i| {
                serde_json::json!({
                    "name": format!("{place} Hotel {i}"),
                    "priceUsd": 120 + i * 15,
                    "link": format!("https://example-stays.test/{}-{i}", slugify(&place)),
                })
            })
            .collect();
        Ok(WidgetOutput {
            widget_type: self.widget_type().to_string(),
            success: true,
            llm_context: format!("Hotel widget: {} options near {place}", cards.len()),
            cards,
            error_message: None,
        })
    }
}

pub struct PlaceWidget;

#[async_trait]
impl Widget for PlaceWidget {
    fn widget_type(&self) -> &str {
        "place"
    }

    fn should_run(&self, classifier: &ClassifierOutput, _query: &str) -> bool {
        classifier.show_place_widget
    }

    async fn run(&self, ctx: WidgetContext) -> Result<WidgetOutput, String> {
        let place = extract_subject(&ctx.query).unwrap_or_else(|| "nearby".to_string());
        let card = serde_json::json!({
            "name": place,
            "category": "point_of_interest",
            "link": format!("https://example-maps.test/{}", slugify(&place)),
        });
        Ok(WidgetOutput {
            widget_type: self.widget_type().to_string(),
            success: true,
            llm_context: format!("Place widget: {}", card),
            cards: vec![card],
            error_message: None,
        })
    }
}

pub struct MovieWidget;

#[async_trait]
impl Widget for MovieWidget {
    fn widget_type(&self) -> &str {
        "movie"
    }

    fn should_run(&self, classifier: &ClassifierOutput, _query: &str) -> bool {
        classifier.show_movie_widget
    }

    async fn run(&self, ctx: WidgetContext) -> Result<WidgetOutput, String> {
        let title = extract_subject(&ctx.query).unwrap_or_else(|| "this title".to_string());
        let card = serde_json::json!({ "title": title, "ratingOutOf10": 7.5 });
        Ok(WidgetOutput {
            widget_type: self.widget_type().to_string(),
            success: true,
            llm_context: format!("Movie widget: {}", card),
            cards: vec![card],
            error_message: None,
        })
    }
}

fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

/// Crude subject extraction: last capitalized-looking or trailing word run.
/// Good enough for a reference widget; a real implementation would use NER.
fn extract_subject(query: &str) -> Option<String> {
    let words: Vec<&str> = query.split_whitespace().collect();
    words.last().map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string()).filter(|s| !s.is_empty())
}

fn extract_arithmetic(query: &str) -> Option<String> {
    let candidate: String = query
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '*' | '/' | '.' | ' ' | '(' | ')'))
        .collect();
    let trimmed = candidate.trim();
    if trimmed.chars().any(|c| c.is_ascii_digit()) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Evaluates `+`/`-` at top precedence over `*`/`/`, left to right, no
/// parentheses — enough for the kinds of queries this widget targets.
fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    eval_additive(&tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '*' => {
                tokens.push(Token::Star);
                chars.next();
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut num = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        num.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Num(num.parse().map_err(|_| format!("bad number: {num}"))?));
            }
            other => return Err(format!("unexpected character: {other}")),
        }
    }
    Ok(tokens)
}

fn eval_additive(tokens: &[Token]) -> Result<f64, String> {
    let mut i = 0;
    let mut acc = eval_term(tokens, &mut i)?;
    while i < tokens.len() {
        match tokens[i] {
            Token::Plus => {
                i += 1;
                acc += eval_term(tokens, &mut i)?;
            }
            Token::Minus => {
                i += 1;
                acc -= eval_term(tokens, &mut i)?;
            }
            _ => return Err("expected + or -".to_string()),
        }
    }
    Ok(acc)
}

fn eval_term(tokens: &[Token], i: &mut usize) -> Result<f64, String> {
    let mut acc = eval_factor(tokens, i)?;
    while *i < tokens.len() {
        match tokens[*i] {
            Token::Star => {
                *i += 1;
                acc *= eval_factor(tokens, i)?;
            }
            Token::Slash => {
                *i += 1;
                let rhs = eval_factor(tokens, i)?;
                if rhs == 0.0 {
                    return Err("division by zero".to_string());
                }
                acc /= rhs;
            }
            _ => break,
        }
    }
    Ok(acc)
}

fn eval_factor(tokens: &[Token], i: &mut usize) -> Result<f64, String> {
    match tokens.get(*i) {
        Some(Token::Num(n)) => {
            *i += 1;
            Ok(*n)
        }
        other => Err(format!("expected number, got {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_precedence_correctly() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("10 / 2 - 1").unwrap(), 4.0);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(evaluate("1 / 0").is_err());
    }

    #[test]
    fn extract_arithmetic_finds_expression() {
        assert_eq!(extract_arithmetic("what is 12 * 7?").unwrap().trim(), "12 * 7");
    }
}
