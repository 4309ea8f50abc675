use malachite::num::arithmetic::traits::{Abs, Gcd, Lcm};
use malachite::num::basic::traits::{One, Zero};
use malachite::{Natural, Rational};
use mendeleev::{ALL_ELEMENTS, Element};
use std::iter::zip;
use thiserror::Error;
use tracing::{debug, trace};





/// Arrow tokens recognized between the reactant and product sides of an equation
pub const ARROWS: [&str; 2] = ["->", "→"];





/// Errors that can occur while parsing or balancing an equation
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BalanceError {
    /// The arrow/side structure of the equation string is malformed
    #[error("{0}")]
    Parse(String),
    /// A compound token is malformed
    #[error("compound {token:?}: {reason}")]
    Format { token: String, reason: String },
    /// No strictly positive integer coefficients balance the equation
    #[error("{0}")]
    Unbalanceable(String),
}
impl BalanceError {
    /// Returns the stable name of the error kind, for diagnostics
    /// # Returns
    /// * `&str` - one of `"ParseError"`, `"FormatError"`, `"UnbalanceableError"`
    /// # Example
    /// ```
    /// use equilib::Equation;
    ///
    /// let error = Equation::parse("H2 + O2 H2O").unwrap_err();
    /// assert_eq!(error.kind(), "ParseError");
    /// ```
    pub fn kind(&self) -> &'static str {
        match self {
            BalanceError::Parse(_) => "ParseError",
            BalanceError::Format { .. } => "FormatError",
            BalanceError::Unbalanceable(_) => "UnbalanceableError",
        }
    }
}

fn format_error(token: &str, reason: impl Into<String>) -> BalanceError {
    BalanceError::Format {
        token: token.to_string(),
        reason: reason.into(),
    }
}





/// A struct that represents a chemical equation (e.g. 2H2 + O2 -> 2H2O)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Equation {
    /// String from which the equation was parsed
    original_str: String,
    /// Arrow token used in the equation
    arrow_type: String,
    /// A vector of reactants
    reactants: Vec<Compound>,
    /// A vector of products
    products: Vec<Compound>,
    /// Distinct elements in first-occurrence order, scanning reactants then products
    elements: Vec<Element>,
    /// Stoichiometric coefficients, one per compound (reactants first, then products)
    coefficients: Option<Vec<i64>>,
}
impl Equation {
    /// Create new equation from a plain-text string
    /// The equation should contain exactly one arrow token separating reactants from products,
    /// with the compounds on each side separated by `+`
    /// # Arguments
    /// * `input` - equation string, e.g. `"C2H5OH + O2 -> CO2 + H2O"`
    /// # Returns
    /// * `Ok` - equation
    /// * `Err` - error that occurred during parsing
    /// # Example
    /// ```
    /// use equilib::{Compound, Equation};
    ///
    /// let equation_str = "H2 + O2 -> H2O";
    /// let equation = Equation::parse(equation_str).unwrap();
    ///
    /// let expected_reactants = vec![
    ///     Compound::parse("H2").unwrap(),
    ///     Compound::parse("O2").unwrap(),
    /// ];
    /// let expected_products = vec![Compound::parse("H2O").unwrap()];
    ///
    /// assert_eq!(equation.original_str(), equation_str);
    /// assert_eq!(equation.reactants(), &expected_reactants);
    /// assert_eq!(equation.products(), &expected_products);
    /// ```
    pub fn parse(input: &str) -> Result<Self, BalanceError> {
        let mut arrow = None;
        for candidate in ARROWS {
            match (input.matches(candidate).count(), arrow) {
                (0, _) => {}
                (1, None) => arrow = Some(candidate),
                _ => {
                    return Err(BalanceError::Parse(
                        "expected exactly one arrow between reactants and products".to_string(),
                    ));
                }
            }
        }
        let arrow = arrow.ok_or_else(|| {
            BalanceError::Parse("missing arrow between reactants and products".to_string())
        })?;

        let (reactants_str, products_str) = input.split_once(arrow).ok_or_else(|| {
            BalanceError::Parse("missing arrow between reactants and products".to_string())
        })?;

        let reactants = parse_side(reactants_str, "reactant")?;
        let products = parse_side(products_str, "product")?;

        // row order of the balance matrix: first occurrence wins, reactants before products
        let mut elements = Vec::new();
        for compound in reactants.iter().chain(products.iter()) {
            for &(element, _) in compound.elements().iter() {
                if !elements.contains(&element) {
                    elements.push(element);
                }
            }
        }

        debug!(
            reactants = reactants.len(),
            products = products.len(),
            elements = elements.len(),
            "parsed equation"
        );

        Ok(Self {
            original_str: input.to_string(),
            arrow_type: arrow.to_string(),
            reactants,
            products,
            elements,
            coefficients: None,
        })
    }

    /// Builds the element-balance matrix of the equation
    /// One row per element (in the order given by [`Equation::elements`]), one column per
    /// compound (reactants in order, then products in order)
    /// A cell holds the atom count of the row's element in the column's compound, negated
    /// for product columns, so a balanced coefficient vector satisfies row · coefficients = 0
    /// for every row
    /// # Returns
    /// * `Vec<Vec<i64>>` - the balance matrix, recomputed deterministically on every call
    /// # Example
    /// ```
    /// use equilib::Equation;
    ///
    /// let equation = Equation::parse("H2 + O2 -> H2O").unwrap();
    ///
    /// assert_eq!(equation.balance_matrix(), vec![
    ///     vec![2, 0, -2],
    ///     vec![0, 2, -1],
    /// ]);
    /// ```
    pub fn balance_matrix(&self) -> Vec<Vec<i64>> {
        let columns = self.reactants.len() + self.products.len();
        let mut matrix = vec![vec![0i64; columns]; self.elements.len()];
        for (row, &element) in self.elements.iter().enumerate() {
            for (col, compound) in self.reactants.iter().enumerate() {
                matrix[row][col] = compound.count_of(element);
            }
            for (col, compound) in self.products.iter().enumerate() {
                matrix[row][self.reactants.len() + col] = -compound.count_of(element);
            }
        }
        matrix
    }

    /// Solves the equation, storing one strictly positive integer coefficient per compound
    /// The stored vector is the smallest one on the solution ray
    /// # Returns
    /// * `Ok` - if the equation was solved successfully
    /// * `Err` - if no strictly positive integer solution exists
    /// # Example
    /// ```
    /// use equilib::Equation;
    ///
    /// let mut equation = Equation::parse("H2 + O2 -> H2O").unwrap();
    /// equation.solve().unwrap();
    ///
    /// assert_eq!(equation.coefficients().unwrap(), &[2, 1, 2]);
    /// ```
    pub fn solve(&mut self) -> Result<(), BalanceError> {
        let matrix = self.balance_matrix();
        let coefficients = solve_balance(&matrix)?;

        if coefficients.iter().any(|&coefficient| coefficient <= 0) {
            return Err(BalanceError::Unbalanceable(
                "no strictly positive coefficients balance the equation".to_string(),
            ));
        }

        // check the conservation law before accepting the solution
        for (element, row) in zip(self.elements.iter(), matrix.iter()) {
            let imbalance: i64 = zip(row.iter(), coefficients.iter())
                .map(|(cell, coefficient)| cell * coefficient)
                .sum();
            if imbalance != 0 {
                return Err(BalanceError::Unbalanceable(format!(
                    "element {} is not conserved by the computed coefficients",
                    element.symbol()
                )));
            }
        }

        trace!(?coefficients, "balance system solved");
        self.coefficients = Some(coefficients);
        Ok(())
    }

    /// Returns the original string from which the equation was parsed
    /// # Returns
    /// * `&str` - original string
    pub fn original_str(&self) -> &str {
        &self.original_str
    }

    /// Returns the arrow token used in the equation
    /// # Returns
    /// * `&str` - arrow token
    /// # Example
    /// ```
    /// use equilib::{ARROWS, Equation};
    ///
    /// let equation = Equation::parse("H2 + O2 -> H2O").unwrap();
    ///
    /// assert_eq!(equation.arrow_type(), "->");
    /// assert!(ARROWS.contains(&equation.arrow_type()));
    /// ```
    pub fn arrow_type(&self) -> &str {
        &self.arrow_type
    }

    /// Returns the vector of reactants
    /// # Returns
    /// * `&Vec<Compound>` - vector of reactants
    pub fn reactants(&self) -> &Vec<Compound> {
        &self.reactants
    }

    /// Returns the vector of products
    /// # Returns
    /// * `&Vec<Compound>` - vector of products
    pub fn products(&self) -> &Vec<Compound> {
        &self.products
    }

    /// Returns the distinct elements of the equation in first-occurrence order, scanning
    /// reactants then products, each compound left to right
    /// The order is stable for the lifetime of the equation and fixes the row order of
    /// [`Equation::balance_matrix`]
    /// # Returns
    /// * `&Vec<Element>` - ordered, duplicate-free elements
    /// # Example
    /// ```
    /// use equilib::Equation;
    /// use mendeleev::Element;
    ///
    /// let equation = Equation::parse("C2H5OH + O2 -> CO2 + H2O").unwrap();
    ///
    /// assert_eq!(equation.elements(), &[Element::C, Element::H, Element::O]);
    /// ```
    pub fn elements(&self) -> &Vec<Element> {
        &self.elements
    }

    /// Returns the stoichiometric coefficients, one per compound, in matrix column order
    /// (reactants in order, then products in order)
    /// # Returns
    /// * `Option<&Vec<i64>>` - coefficients, or `None` if the equation has not been solved
    /// # Example
    /// ```
    /// use equilib::Equation;
    ///
    /// let mut equation = Equation::parse("C2H5OH + O2 -> CO2 + H2O").unwrap();
    /// assert_eq!(equation.coefficients(), None);
    ///
    /// equation.solve().unwrap();
    /// assert_eq!(equation.coefficients().unwrap(), &[1, 3, 2, 3]);
    /// ```
    pub fn coefficients(&self) -> Option<&Vec<i64>> {
        self.coefficients.as_ref()
    }

    /// Returns the balanced equation as a string
    /// Each compound is prefixed by its coefficient unless the coefficient is 1; compounds
    /// on a side are joined by `" + "` and the sides are joined by the arrow token the
    /// equation was parsed with
    /// # Returns
    /// * `Option<String>` - balanced equation, or `None` if the equation has not been solved
    /// # Example
    /// ```
    /// use equilib::Equation;
    ///
    /// let mut equation = Equation::parse("C2H5OH + O2 -> CO2 + H2O").unwrap();
    /// equation.solve().unwrap();
    ///
    /// assert_eq!(equation.balanced_str().unwrap(), "C2H5OH + 3O2 -> 2CO2 + 3H2O");
    /// ```
    pub fn balanced_str(&self) -> Option<String> {
        let coefficients = self.coefficients.as_ref()?;
        let (reactant_coefficients, product_coefficients) =
            coefficients.split_at(self.reactants.len());

        let render_side = |compounds: &[Compound], coefficients: &[i64]| -> String {
            let mut side = String::new();
            for (i, (compound, &coefficient)) in
                zip(compounds.iter(), coefficients.iter()).enumerate()
            {
                if i != 0 {
                    side.push_str(" + ");
                }
                if coefficient != 1 {
                    side.push_str(&coefficient.to_string());
                }
                side.push_str(compound.original_str());
            }
            side
        };

        Some(format!(
            "{} {} {}",
            render_side(&self.reactants, reactant_coefficients),
            self.arrow_type,
            render_side(&self.products, product_coefficients)
        ))
    }
}

fn parse_side(side: &str, role: &str) -> Result<Vec<Compound>, BalanceError> {
    side.split('+')
        .map(|token| {
            let token = token.trim();
            if token.is_empty() {
                return Err(BalanceError::Parse(format!(
                    "expected a {role} compound, found nothing"
                )));
            }
            Compound::parse(token)
        })
        .collect()
}





/// A struct that represents a chemical compound (e.g. H2O, NaCl, ...)
/// # Example
/// ```
/// use equilib::Compound;
///
/// let compound = Compound::parse("H2O").unwrap();
///
/// assert_eq!(compound.original_str(), "H2O");
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Compound {
    /// String from which the compound was parsed
    original_str: String,
    /// Elements and their atom counts, in first-occurrence order
    elements: Vec<(Element, i64)>,
}
impl Compound {
    /// Create new compound from a flat symbol-count token
    /// The token is scanned left to right: an uppercase letter starts an element symbol,
    /// lowercase letters extend it, and an optional digit run gives the atom count
    /// (1 when absent)
    /// Repeated occurrences of one element accumulate
    /// Parentheses, hydrates and charges are not part of the token grammar
    /// # Arguments
    /// * `input` - compound token, e.g. `"C2H5OH"`
    /// # Returns
    /// * `Ok` - compound
    /// * `Err` - error that occurred during scanning
    /// # Example
    /// ```
    /// use equilib::Compound;
    /// use mendeleev::Element;
    ///
    /// let compound = Compound::parse("C2H5OH").unwrap();
    ///
    /// assert_eq!(
    ///     compound.elements(),
    ///     &[(Element::C, 2), (Element::H, 6), (Element::O, 1)],
    /// );
    /// ```
    pub fn parse(input: &str) -> Result<Self, BalanceError> {
        let mut elements: Vec<(Element, i64)> = Vec::new();
        let mut chars = input.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_ascii_uppercase() {
                chars.next();
                let mut symbol = String::from(c);
                while let Some(&lower) = chars.peek() {
                    if !lower.is_ascii_lowercase() {
                        break;
                    }
                    symbol.push(lower);
                    chars.next();
                }
                let element = ALL_ELEMENTS
                    .iter()
                    .find(|candidate| candidate.symbol() == symbol)
                    .copied()
                    .ok_or_else(|| {
                        format_error(input, format!("unknown element symbol {symbol:?}"))
                    })?;

                let mut digits = String::new();
                while let Some(&digit) = chars.peek() {
                    if !digit.is_ascii_digit() {
                        break;
                    }
                    digits.push(digit);
                    chars.next();
                }
                let count = if digits.is_empty() {
                    1
                } else {
                    digits.parse::<i64>().map_err(|_| {
                        format_error(input, format!("atom count {digits:?} is out of range"))
                    })?
                };

                match elements.iter_mut().find(|(existing, _)| *existing == element) {
                    Some((_, total)) => *total += count,
                    None => elements.push((element, count)),
                }
            } else if c.is_ascii_digit() {
                return Err(format_error(
                    input,
                    "digit without a preceding element symbol",
                ));
            } else if c.is_ascii_lowercase() {
                return Err(format_error(
                    input,
                    "lowercase letter without a preceding element symbol",
                ));
            } else {
                return Err(format_error(input, format!("unexpected character {c:?}")));
            }
        }

        if elements.is_empty() {
            return Err(format_error(input, "no element symbols"));
        }

        Ok(Self {
            original_str: input.to_string(),
            elements,
        })
    }

    /// Returns the original token from which the compound was parsed
    /// # Returns
    /// * `&str` - original token
    pub fn original_str(&self) -> &str {
        &self.original_str
    }

    /// Returns the elements of the compound and their atom counts, in first-occurrence order
    /// # Returns
    /// * `&Vec<(Element, i64)>` - elements and counts
    /// # Example
    /// ```
    /// use equilib::Compound;
    /// use mendeleev::Element;
    ///
    /// let compound = Compound::parse("H2O").unwrap();
    ///
    /// assert_eq!(compound.elements(), &[(Element::H, 2), (Element::O, 1)]);
    /// ```
    pub fn elements(&self) -> &Vec<(Element, i64)> {
        &self.elements
    }

    /// Returns the atom count of an element in the compound, 0 if the element is absent
    pub fn count_of(&self, element: Element) -> i64 {
        self.elements
            .iter()
            .find(|(candidate, _)| *candidate == element)
            .map_or(0, |&(_, count)| count)
    }
}





/// Finds the smallest integer coefficient vector in the null space of a balance matrix
///
/// The whole solving engine sits behind this one function: callers hand over the matrix
/// produced by [`Equation::balance_matrix`] and get back one integer per column, so the
/// engine can be swapped without touching the parsing or rendering stages
///
/// The system is homogeneous and scale-invariant, so one extra equation pins the last
/// coefficient to 1; Gaussian elimination over exact rationals then yields the unique
/// solution ray, which is scaled by the least common multiple of the denominators and
/// reduced by the greatest common divisor of the entries to the primitive integer vector
/// # Arguments
/// * `matrix` - balance matrix; rows are elements, columns are compounds
/// # Returns
/// * `Ok` - smallest integer coefficient vector, one entry per column
/// * `Err` - the system has no solution, or does not determine a unique ray
/// # Example
/// ```
/// use equilib::solve_balance;
///
/// // H2 + O2 -> H2O
/// let matrix = vec![
///     vec![2, 0, -2],
///     vec![0, 2, -1],
/// ];
///
/// assert_eq!(solve_balance(&matrix).unwrap(), vec![2, 1, 2]);
/// ```
pub fn solve_balance(matrix: &[Vec<i64>]) -> Result<Vec<i64>, BalanceError> {
    let cols = matrix.first().map_or(0, Vec::len);
    if cols == 0 {
        return Err(BalanceError::Unbalanceable(
            "the balance system has no compounds".to_string(),
        ));
    }
    if matrix.iter().any(|row| row.len() != cols) {
        return Err(BalanceError::Unbalanceable(
            "the balance matrix rows have unequal lengths".to_string(),
        ));
    }

    // augmented rational system: one homogeneous equation per element, plus one equation
    // pinning the last coefficient to 1 to select a representative from the solution ray
    let mut system: Vec<Vec<Rational>> = Vec::with_capacity(matrix.len() + 1);
    for row in matrix {
        let mut equation: Vec<Rational> = row.iter().map(|&cell| Rational::from(cell)).collect();
        equation.push(Rational::ZERO);
        system.push(equation);
    }
    let mut pin = vec![Rational::ZERO; cols + 1];
    pin[cols - 1] = Rational::ONE;
    pin[cols] = Rational::ONE;
    system.push(pin);

    if system.len() < cols {
        return Err(BalanceError::Unbalanceable(
            "more compounds than element constraints, the coefficients are not unique".to_string(),
        ));
    }

    debug!(rows = system.len(), cols, "eliminating balance system");
    eliminate(&mut system, cols);

    // a column of zeros means the corresponding coefficient is unconstrained
    for col in 0..cols {
        if system.iter().all(|row| row[col] == Rational::ZERO) {
            return Err(BalanceError::Unbalanceable(
                "a coefficient is unconstrained, the balance system is degenerate".to_string(),
            ));
        }
    }

    // surplus rows must have been reduced away; a leftover non-zero row is a constraint
    // the remaining square system cannot satisfy
    for surplus in system.split_off(cols) {
        if surplus.iter().any(|cell| *cell != Rational::ZERO) {
            return Err(BalanceError::Unbalanceable(
                "the element constraints are inconsistent".to_string(),
            ));
        }
    }

    let solution = back_substitute(&system, cols)?;

    // scale the rational solution to the primitive integer vector on the same ray
    let mut lcm = Natural::ONE;
    for value in solution.iter() {
        lcm = lcm.lcm(value.denominator_ref());
    }
    let scale = Rational::from(&lcm);
    let scaled: Vec<Rational> = solution.iter().map(|value| value * &scale).collect();

    let mut gcd = Natural::ZERO;
    for value in scaled.iter() {
        gcd = gcd.gcd(value.numerator_ref());
    }
    if gcd == Natural::ZERO {
        return Err(BalanceError::Unbalanceable(
            "the balance system only admits the all-zero solution".to_string(),
        ));
    }
    let shrink = Rational::from(&gcd);

    scaled
        .iter()
        .map(|value| i64::try_from(&(value / &shrink)))
        .collect::<Result<Vec<i64>, _>>()
        .map_err(|_| {
            BalanceError::Unbalanceable("a coefficient does not fit in an i64".to_string())
        })
}

/// Reduces the augmented system to row echelon form with exact rational arithmetic,
/// pivoting on the largest entry of each column
fn eliminate(system: &mut [Vec<Rational>], cols: usize) {
    let rows = system.len();
    let mut row = 0;
    let mut col = 0;
    while row < rows && col < cols {
        let mut pivot = row;
        for candidate in (row + 1)..rows {
            if (&system[candidate][col]).abs() > (&system[pivot][col]).abs() {
                pivot = candidate;
            }
        }

        if system[pivot][col] == Rational::ZERO {
            col += 1;
            continue;
        }
        system.swap(row, pivot);

        for lower in (row + 1)..rows {
            if system[lower][col] == Rational::ZERO {
                continue;
            }
            let factor = &system[lower][col] / &system[row][col];
            system[lower][col] = Rational::ZERO;
            for c in (col + 1)..=cols {
                let scaled = &factor * &system[row][c];
                system[lower][c] -= scaled;
            }
        }

        row += 1;
        col += 1;
    }
}

/// Reads the solution of a square row-echelon system back to front
/// A zero pivot means the system is rank deficient and does not determine a unique solution
fn back_substitute(system: &[Vec<Rational>], cols: usize) -> Result<Vec<Rational>, BalanceError> {
    let mut solution = vec![Rational::ZERO; cols];
    for row in (0..cols).rev() {
        if system[row][row] == Rational::ZERO {
            return Err(BalanceError::Unbalanceable(
                "the balance system does not determine a unique coefficient ray".to_string(),
            ));
        }
        let mut value = system[row][cols].clone();
        for col in (row + 1)..cols {
            let scaled = &system[row][col] * &solution[col];
            value -= scaled;
        }
        solution[row] = value / &system[row][row];
    }
    Ok(solution)
}
