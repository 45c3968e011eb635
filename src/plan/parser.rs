use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, multispace0, none_of, one_of};
use nom::combinator::{all_consuming, map, opt, recognize};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

use crate::error::{OptResult, OptimizerError};
use crate::operator::JoinStrategyKind;
use crate::plan::OptimizerPlan;

pub(super) fn parse_plan(text: &str) -> OptResult<OptimizerPlan> {
    match all_consuming(terminated(plan, multispace0))(text) {
        Ok((_, plan)) => Ok(plan),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(OptimizerError::OverrideParse(format!("unexpected input at '{}'", e.input)))
        }
        Err(nom::Err::Incomplete(_)) => {
            Err(OptimizerError::OverrideParse("incomplete plan".to_string()))
        }
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// `term (op term)*`, folded to the left.
fn plan(input: &str) -> IResult<&str, OptimizerPlan> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(ws(strategy), term))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |left, (strategy, right)| {
            OptimizerPlan::join(strategy, left, right)
        }),
    ))
}

fn strategy(input: &str) -> IResult<&str, JoinStrategyKind> {
    map(one_of("*#"), |c| {
        if c == '#' {
            JoinStrategyKind::Hash
        } else {
            JoinStrategyKind::NestedLoop
        }
    })(input)
}

fn term(input: &str) -> IResult<&str, OptimizerPlan> {
    ws(alt((delimited(char('('), plan, ws(char(')'))), row_source)))(input)
}

fn row_source(input: &str) -> IResult<&str, OptimizerPlan> {
    let (input, first) = identifier(input)?;
    let (input, second) = opt(preceded(char('.'), identifier))(input)?;
    let (input, call) = opt(tuple((multispace0, char('('), multispace0, char(')'))))(input)?;
    let (schema, name) = match second {
        Some(name) => (Some(first), name),
        None => (None, first),
    };
    let plan = if call.is_some() {
        OptimizerPlan::table_function(schema.as_deref(), &name)
    } else {
        OptimizerPlan::conglomerate(schema.as_deref(), &name)
    };
    Ok((input, plan))
}

/// Regular identifiers are case folded to upper case; delimited ones are kept verbatim.
fn identifier(input: &str) -> IResult<&str, String> {
    alt((
        map(
            delimited(
                char('"'),
                recognize(many0(alt((tag("\"\""), recognize(none_of("\"")))))),
                char('"'),
            ),
            |s: &str| s.replace("\"\"", "\""),
        ),
        map(
            take_while1(|c: char| c.is_alphanumeric() || c == '_'),
            |s: &str| s.to_uppercase(),
        ),
    ))(input)
}
