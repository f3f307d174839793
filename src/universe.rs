/// Code ranges excluded from processing: derivative, warrant and debt
/// listings that never carry signal ledgers.
const EXCLUDE_RANGES: [(u32, u32); 13] = [
    (2900, 2999),
    (4000, 4199),
    (4200, 4299),
    (4300, 4329),
    (4400, 4599),
    (4600, 4699),
    (4700, 4799),
    (4800, 4999),
    (5000, 6029),
    (6200, 6299),
    (6750, 7699),
    (7800, 7999),
    (8510, 8600),
];

fn numeric_code(value: &str) -> Option<u32> {
    let code = value.trim().parse::<u32>().ok()?;
    if code <= 9999 {
        Some(code)
    } else {
        None
    }
}

pub fn is_processable_code(value: &str) -> bool {
    match numeric_code(value) {
        Some(code) => !EXCLUDE_RANGES
            .iter()
            .any(|(start, end)| (*start..=*end).contains(&code)),
        None => false,
    }
}

/// Restricts a raw code list to the processable equity universe,
/// preserving input order.
pub fn filter_universe<S: AsRef<str>>(codes: &[S]) -> Vec<String> {
    codes
        .iter()
        .map(|code| code.as_ref().trim().to_string())
        .filter(|code| is_processable_code(code))
        .collect()
}
