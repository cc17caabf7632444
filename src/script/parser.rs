//! Parser implementation using Pest.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::time::Duration;

use crate::script::error::ScriptError;
use crate::{Batcher, Case, Pattern, Signal};

#[derive(Parser)]
#[grammar = "script/grammar.pest"]
pub struct BatchParser;

/// Parse a script into batch entries.
///
/// A `timeout` statement applies to every later expect and switch that
/// has no timeout of its own.
pub fn parse_script(input: &str) -> Result<Vec<Batcher>, ScriptError> {
    let pairs = BatchParser::parse(Rule::script, input)?;
    let mut current_timeout = None;
    let mut entries = Vec::new();

    for pair in pairs.flatten().filter(|p| p.as_rule() == Rule::statement) {
        let Some(inner) = pair.into_inner().next() else {
            continue;
        };
        match inner.as_rule() {
            Rule::timeout_stmt => {
                current_timeout = Some(parse_duration(first(inner)?)?);
            }
            Rule::expect_stmt => entries.push(parse_expect(inner, current_timeout)?),
            Rule::sendline_stmt => {
                let mut data = parse_string(first(inner)?)?;
                data.push(b'\n');
                entries.push(Batcher::Send(data));
            }
            Rule::send_stmt => entries.push(Batcher::Send(parse_string(first(inner)?)?)),
            Rule::signal_stmt => entries.push(Batcher::Signal(parse_signal(first(inner)?)?)),
            Rule::switch_stmt => entries.push(parse_switch(inner, current_timeout)?),
            _ => {}
        }
    }

    Ok(entries)
}

fn parse_expect(pair: Pair<Rule>, current: Option<Duration>) -> Result<Batcher, ScriptError> {
    let mut inner = pair.into_inner();
    let pattern = parse_pattern(next(&mut inner)?)?;
    let timeout = inner.next().map(parse_duration).transpose()?.or(current);
    Ok(Batcher::Expect { pattern, timeout })
}

fn parse_switch(pair: Pair<Rule>, current: Option<Duration>) -> Result<Batcher, ScriptError> {
    let line = line_of(&pair);
    let mut timeout = current;
    let mut cases = Vec::new();

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::duration => timeout = Some(parse_duration(item)?),
            Rule::case_stmt => cases.push(parse_case(item)?),
            _ => {}
        }
    }

    if cases.is_empty() {
        return Err(ScriptError::InvalidValue {
            line,
            message: "switch without cases".to_string(),
        });
    }
    Ok(Batcher::Switch { cases, timeout })
}

fn parse_case(pair: Pair<Rule>) -> Result<Case, ScriptError> {
    let mut inner = pair.into_inner();
    let mut case = Case::new(parse_pattern(next(&mut inner)?)?);

    for clause in inner {
        case = match clause.as_rule() {
            Rule::respond => case.respond(parse_text(first(clause)?)?),
            Rule::continue_clause => {
                let number = first(clause)?;
                let max = number
                    .as_str()
                    .parse()
                    .map_err(|_| invalid(&number, "continue count out of range"))?;
                case.continue_after_match(max)
            }
            Rule::fail_clause => case.fail(parse_text(first(clause)?)?),
            _ => case,
        };
    }

    Ok(case)
}

fn parse_pattern(pair: Pair<Rule>) -> Result<Pattern, ScriptError> {
    let line = line_of(&pair);
    let mut exact = false;
    let mut text = None;

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::exact => exact = true,
            Rule::string => text = Some(parse_text(item)?),
            _ => {}
        }
    }

    let text = text.ok_or_else(|| ScriptError::InvalidValue {
        line,
        message: "pattern without text".to_string(),
    })?;
    if exact {
        Ok(Pattern::exact(text))
    } else {
        Pattern::regex(&text).map_err(|source| ScriptError::PatternError { line, source })
    }
}

fn parse_signal(pair: Pair<Rule>) -> Result<Signal, ScriptError> {
    Signal::from_name(pair.as_str())
        .ok_or_else(|| invalid(&pair, &format!("unknown signal {}", pair.as_str())))
}

fn parse_duration(pair: Pair<Rule>) -> Result<Duration, ScriptError> {
    let text = pair.as_str();
    let digits = text.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let value: u64 = digits
        .parse()
        .map_err(|_| invalid(&pair, "duration out of range"))?;

    Ok(match &text[digits.len()..] {
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        _ => Duration::from_secs(value),
    })
}

fn parse_text(pair: Pair<Rule>) -> Result<String, ScriptError> {
    let line = line_of(&pair);
    String::from_utf8(parse_string(pair)?).map_err(|_| ScriptError::InvalidValue {
        line,
        message: "text is not valid UTF-8".to_string(),
    })
}

fn parse_string(pair: Pair<Rule>) -> Result<Vec<u8>, ScriptError> {
    let inner = first(pair)?;
    Ok(super::unescape(inner.as_str()))
}

fn first(pair: Pair<Rule>) -> Result<Pair<Rule>, ScriptError> {
    let mut inner = pair.into_inner();
    next(&mut inner)
}

fn next<'a>(inner: &mut pest::iterators::Pairs<'a, Rule>) -> Result<Pair<'a, Rule>, ScriptError> {
    inner.next().ok_or_else(|| ScriptError::ParseError {
        line: 0,
        col: 0,
        message: "incomplete statement".to_string(),
    })
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn invalid(pair: &Pair<Rule>, message: &str) -> ScriptError {
    ScriptError::InvalidValue {
        line: line_of(pair),
        message: message.to_string(),
    }
}
