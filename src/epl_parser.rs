use crate::aggregation::{AggregateFunction, AggregationSpec};
use crate::error::{CepError, Result};
use crate::parsed_statement::{
    FilterExpr, Operator, ParsedStatement, SelectItem, StreamSelector, WindowDefinition,
};
use crate::value::Value;
use regex::{Captures, Regex};
use std::sync::LazyLock;

const STATEMENT_PATTERN: &str = r"(?is)^\s*select\s+(?:(?P<stream>irstream|istream|rstream)\s+)?(?P<items>.+?)\s+from\s+(?P<type>[A-Za-z_][A-Za-z0-9_]*)(?:\.win:time\(\s*(?P<amount>\d+(?:\.\d+)?)\s*(?P<unit>[a-z]+)\s*\))?(?:\s+where\s+(?P<filter>.+?))?\s*;?\s*$";

const ITEM_PATTERN: &str = r"(?i)^(?:(?P<func>[A-Za-z_][A-Za-z0-9_]*)\s*\(\s*(?P<arg>\*|[A-Za-z_][A-Za-z0-9_]*)\s*\)|(?P<star>\*)|(?P<field>[A-Za-z_][A-Za-z0-9_]*))(?:\s+as\s+(?P<alias>[A-Za-z_][A-Za-z0-9_]*))?$";

const TOKEN_PATTERN: &str = r#"^\s*(?:(?P<op>>=|<=|!=|<>|==|=|>|<)|'(?P<sq>[^']*)'|"(?P<dq>[^"]*)"|(?P<num>-?\d+(?:\.\d+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<paren>[()]))"#;

type CompiledPattern = LazyLock<std::result::Result<Regex, regex::Error>>;

static STATEMENT_RE: CompiledPattern = LazyLock::new(|| Regex::new(STATEMENT_PATTERN));
static ITEM_RE: CompiledPattern = LazyLock::new(|| Regex::new(ITEM_PATTERN));
static TOKEN_RE: CompiledPattern = LazyLock::new(|| Regex::new(TOKEN_PATTERN));

fn compiled(pattern: &'static CompiledPattern) -> Result<&'static Regex> {
    LazyLock::force(pattern)
        .as_ref()
        .map_err(|e| CepError::Parse(format!("invalid pattern: {}", e)))
}

/// Parser for the statement subset accepted by [`crate::CEPEngine::create_epl`]:
///
/// ```text
/// select [istream|rstream|irstream] <items> from <Type>[.win:time(<n> <unit>)] [where <cond>]
/// ```
pub struct EplParser {
    statement: String,
}

impl EplParser {
    pub fn new(statement: String) -> Self {
        Self { statement }
    }

    pub fn parse(&self) -> Result<ParsedStatement> {
        let statement_re = compiled(&STATEMENT_RE)?;
        let captures = statement_re.captures(&self.statement).ok_or_else(|| {
            CepError::Parse(format!("unrecognised statement '{}'", self.statement.trim()))
        })?;

        let stream = match captures.name("stream").map(|m| m.as_str().to_ascii_lowercase()) {
            Some(ref s) if s == "istream" => StreamSelector::IStream,
            Some(ref s) if s == "rstream" => StreamSelector::RStream,
            _ => StreamSelector::IRStream,
        };

        let select = parse_select_items(&captures["items"])?;
        let input_type = captures["type"].to_string();
        let window = parse_window(&captures)?;
        let filter = match captures.name("filter") {
            Some(filter) => Some(FilterParser::new(filter.as_str())?.parse()?),
            None => None,
        };

        Ok(ParsedStatement {
            stream,
            select,
            input_type,
            window,
            filter,
        })
    }
}

fn parse_select_items(items: &str) -> Result<Vec<SelectItem>> {
    let item_re = compiled(&ITEM_RE)?;
    let mut select = Vec::new();

    for raw in items.split(',') {
        let raw = raw.trim();
        let captures = item_re
            .captures(raw)
            .ok_or_else(|| CepError::Parse(format!("unsupported select item '{}'", raw)))?;
        let alias = captures.name("alias").map(|m| m.as_str().to_string());

        let item = if let Some(func) = captures.name("func") {
            let function: AggregateFunction = func.as_str().parse()?;
            let spec = match &captures["arg"] {
                "*" if function == AggregateFunction::Count => AggregationSpec::count_all(),
                "*" => {
                    return Err(CepError::Parse(format!(
                        "{}(*) is not supported",
                        function.name()
                    )));
                }
                field => AggregationSpec::new(function, field),
            };
            SelectItem::Aggregate { spec, alias }
        } else if captures.name("star").is_some() {
            if alias.is_some() {
                return Err(CepError::Parse("'*' cannot be aliased".to_string()));
            }
            SelectItem::Wildcard
        } else {
            SelectItem::Field {
                name: captures["field"].to_string(),
                alias,
            }
        };
        select.push(item);
    }

    let aggregates = select
        .iter()
        .filter(|item| matches!(item, SelectItem::Aggregate { .. }))
        .count();
    if aggregates > 1 {
        return Err(CepError::Parse(
            "at most one aggregate function per statement is supported".to_string(),
        ));
    }

    Ok(select)
}

fn parse_window(captures: &Captures<'_>) -> Result<Option<WindowDefinition>> {
    let (Some(amount), Some(unit)) = (captures.name("amount"), captures.name("unit")) else {
        return Ok(None);
    };

    let amount: f64 = amount
        .as_str()
        .parse()
        .map_err(|_| CepError::Parse(format!("invalid window length '{}'", amount.as_str())))?;
    let millis_per_unit = match unit.as_str().to_ascii_lowercase().as_str() {
        "msec" | "ms" | "millisecond" | "milliseconds" => 1.0,
        "sec" | "s" | "second" | "seconds" => 1_000.0,
        "min" | "minute" | "minutes" => 60_000.0,
        "hour" | "hours" => 3_600_000.0,
        other => {
            return Err(CepError::Parse(format!("unknown time unit '{}'", other)));
        }
    };

    Ok(Some(WindowDefinition::time(
        (amount * millis_per_unit).round() as i64,
    )))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Op(Operator),
    Literal(Value),
    Ident(String),
    LParen,
    RParen,
}

/// Recursive descent over `where` clauses; `and` binds tighter than `or`.
struct FilterParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl FilterParser {
    fn new(input: &str) -> Result<Self> {
        let token_re = compiled(&TOKEN_RE)?;
        let mut tokens = Vec::new();
        let mut rest = input;

        while !rest.trim().is_empty() {
            let captures = token_re.captures(rest).ok_or_else(|| {
                CepError::Parse(format!("unexpected input in where clause at '{}'", rest.trim()))
            })?;

            let token = if let Some(op) = captures.name("op") {
                Operator::from_symbol(op.as_str())
                    .map(Token::Op)
                    .ok_or_else(|| CepError::Parse(format!("unknown operator '{}'", op.as_str())))?
            } else if let Some(s) = captures.name("sq").or_else(|| captures.name("dq")) {
                Token::Literal(Value::String(s.as_str().to_string()))
            } else if let Some(num) = captures.name("num") {
                Token::Literal(parse_number(num.as_str())?)
            } else if let Some(ident) = captures.name("ident") {
                match ident.as_str().to_ascii_lowercase().as_str() {
                    "true" => Token::Literal(Value::Boolean(true)),
                    "false" => Token::Literal(Value::Boolean(false)),
                    _ => Token::Ident(ident.as_str().to_string()),
                }
            } else if &captures["paren"] == "(" {
                Token::LParen
            } else {
                Token::RParen
            };

            tokens.push(token);
            rest = &rest[captures.get(0).map_or(rest.len(), |m| m.end())..];
        }

        Ok(Self { tokens, pos: 0 })
    }

    fn parse(mut self) -> Result<FilterExpr> {
        let expr = self.parse_or()?;
        match self.tokens.get(self.pos) {
            None => Ok(expr),
            Some(token) => Err(CepError::Parse(format!(
                "unexpected token {:?} in where clause",
                token
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<FilterExpr> {
        let mut expr = self.parse_and()?;
        while self.eat_keyword("or") {
            expr = expr.or(self.parse_and()?);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<FilterExpr> {
        let mut expr = self.parse_atom()?;
        while self.eat_keyword("and") {
            expr = expr.and(self.parse_atom()?);
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<FilterExpr> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(CepError::Parse("missing ')' in where clause".to_string())),
                }
            }
            Some(Token::Ident(field)) => match (self.next(), self.next()) {
                (Some(Token::Op(op)), Some(Token::Literal(value))) => {
                    Ok(FilterExpr::Compare { field, op, value })
                }
                _ => Err(CepError::Parse(format!(
                    "expected '<operator> <literal>' after '{}'",
                    field
                ))),
            },
            other => Err(CepError::Parse(format!(
                "expected a comparison, found {:?}",
                other
            ))),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.tokens.get(self.pos) {
            Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }
}

fn parse_number(text: &str) -> Result<Value> {
    let parsed = if text.contains('.') {
        text.parse::<f64>().ok().map(Value::Float)
    } else {
        text.parse::<i64>().ok().map(Value::Integer)
    };
    parsed.ok_or_else(|| CepError::Parse(format!("invalid number '{}'", text)))
}
