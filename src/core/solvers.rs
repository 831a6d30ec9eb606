//! Linear program solving behind a small capability interface, so that the optimiser can run
//! against a real backend or against one that is known to be missing.

use crate::errors::SolverError;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use strum_macros::{Display, EnumString};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Relation {
    AtLeast,
    AtMost,
    Equal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinearConstraint {
    pub coefficients: Vec<f64>,
    pub relation: Relation,
    pub rhs: f64,
}

/// Minimise `objective · x` subject to `0 <= x_i <= upper_bounds[i]` and the linear constraints.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearProgram {
    pub objective: Vec<f64>,
    pub upper_bounds: Vec<f64>,
    pub constraints: Vec<LinearConstraint>,
}

pub trait LinearProgramSolver: Send + Sync {
    fn name(&self) -> &str;

    /// Optimal values of the program's variables, in variable order.
    fn solve(&self, program: &LinearProgram) -> Result<Vec<f64>, SolverError>;
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, EnumString, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolverBackend {
    /// Dense simplex; exact vertex solutions.
    #[default]
    Microlp,
    /// Interior point; solutions are accurate to the solver's convergence tolerance.
    Clarabel,
}

/// Solver backed by the pure-Rust solvers available through `good_lp`.
#[derive(Clone, Debug)]
pub struct GoodLpSolver {
    backend: SolverBackend,
    timeout: Option<Duration>,
    workers: WorkerLimit,
}

impl GoodLpSolver {
    /// With a timeout, at most twice as many solves as there are rayon threads may be in
    /// flight at once, including solves abandoned after their deadline.
    pub fn new(backend: SolverBackend, timeout: Option<Duration>) -> Self {
        Self {
            backend,
            timeout,
            workers: WorkerLimit::new(2 * rayon::current_num_threads()),
        }
    }
}

impl LinearProgramSolver for GoodLpSolver {
    fn name(&self) -> &str {
        match self.backend {
            SolverBackend::Microlp => "microlp",
            SolverBackend::Clarabel => "clarabel",
        }
    }

    fn solve(&self, program: &LinearProgram) -> Result<Vec<f64>, SolverError> {
        check_dimensions(program)?;
        let backend = self.backend;
        match self.timeout {
            None => solve_with_backend(backend, program),
            Some(timeout) => {
                let program = program.clone();
                run_with_deadline(&self.workers, timeout, move || {
                    solve_with_backend(backend, &program)
                })
            }
        }
    }
}

/// Stands in for a backend that is not installed; every solve reports it as unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableSolver;

impl LinearProgramSolver for UnavailableSolver {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn solve(&self, _program: &LinearProgram) -> Result<Vec<f64>, SolverError> {
        Err(SolverError::Unavailable(
            "no linear program backend is configured".to_string(),
        ))
    }
}

fn check_dimensions(program: &LinearProgram) -> Result<(), SolverError> {
    let variable_count = program.objective.len();
    if program.upper_bounds.len() != variable_count
        || program
            .constraints
            .iter()
            .any(|constraint| constraint.coefficients.len() != variable_count)
    {
        return Err(SolverError::Failed(format!(
            "program dimensions do not agree with its {variable_count} variables"
        )));
    }
    Ok(())
}

/// Counts live solver threads, shared between clones of a solver.
#[derive(Clone, Debug)]
pub(crate) struct WorkerLimit {
    live: Arc<AtomicUsize>,
    max: usize,
}

impl WorkerLimit {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            max: max.max(1),
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Option<WorkerSlot> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.max).then_some(live + 1)
            })
            .ok()
            .map(|_| WorkerSlot(self.live.clone()))
    }
}

/// Held by a worker thread for as long as it runs.
struct WorkerSlot(Arc<AtomicUsize>);

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run `job` on a worker thread, giving up on it once `timeout` has passed.
///
/// An abandoned worker keeps running until its job finishes, and its result is dropped. It still
/// counts against `workers`, so once the limit is reached by slow jobs further calls report the
/// solver as unavailable instead of starting more threads.
pub(crate) fn run_with_deadline<T: Send + 'static>(
    workers: &WorkerLimit,
    timeout: Duration,
    job: impl FnOnce() -> Result<T, SolverError> + Send + 'static,
) -> Result<T, SolverError> {
    let slot = workers.acquire().ok_or_else(|| {
        SolverError::Unavailable(format!(
            "all {} solver workers are still busy with earlier solves",
            workers.max
        ))
    })?;
    let (sender, receiver) = mpsc::sync_channel(1);
    thread::spawn(move || {
        let _slot = slot;
        // the receiver may be gone if the deadline passed
        let _ = sender.send(job());
    });

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SolverError::TimedOut(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SolverError::Failed(
            "solver worker stopped without a result".to_string(),
        )),
    }
}

fn solve_with_backend(
    backend: SolverBackend,
    program: &LinearProgram,
) -> Result<Vec<f64>, SolverError> {
    let mut problem = ProblemVariables::new();
    let variables: Vec<Variable> = program
        .upper_bounds
        .iter()
        .map(|upper| problem.add(variable().min(0.).max(*upper)))
        .collect();

    let objective = linear_expression(&variables, &program.objective);
    let constraints = program.constraints.iter().map(|linear| {
        let lhs = linear_expression(&variables, &linear.coefficients);
        let rhs = linear.rhs;
        match linear.relation {
            Relation::AtLeast => constraint!(lhs >= rhs),
            Relation::AtMost => constraint!(lhs <= rhs),
            Relation::Equal => constraint!(lhs == rhs),
        }
    });

    match backend {
        SolverBackend::Microlp => solve_model(
            problem.minimise(objective).using(good_lp::microlp),
            constraints,
            &variables,
        ),
        SolverBackend::Clarabel => solve_model(
            problem.minimise(objective).using(good_lp::clarabel),
            constraints,
            &variables,
        ),
    }
}

fn linear_expression(variables: &[Variable], coefficients: &[f64]) -> Expression {
    variables
        .iter()
        .zip(coefficients)
        .map(|(variable, coefficient)| *variable * *coefficient)
        .sum()
}

fn solve_model<M: SolverModel<Error = ResolutionError>>(
    model: M,
    constraints: impl IntoIterator<Item = good_lp::Constraint>,
    variables: &[Variable],
) -> Result<Vec<f64>, SolverError> {
    let solution = model
        .with_all(constraints)
        .solve()
        .map_err(|error| match error {
            ResolutionError::Infeasible => SolverError::Infeasible,
            other => SolverError::Failed(other.to_string()),
        })?;

    Ok(variables
        .iter()
        .map(|variable| solution.value(*variable))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::time::Instant;

    /// min 3x + 2y subject to x + y = 1, y <= 0.6
    #[fixture]
    fn two_variable_program() -> LinearProgram {
        LinearProgram {
            objective: vec![3., 2.],
            upper_bounds: vec![1., 0.6],
            constraints: vec![LinearConstraint {
                coefficients: vec![1., 1.],
                relation: Relation::Equal,
                rhs: 1.,
            }],
        }
    }

    #[rstest]
    #[case(SolverBackend::Microlp, 1e-9)]
    #[case(SolverBackend::Clarabel, 1e-5)]
    fn should_solve_small_program(
        two_variable_program: LinearProgram,
        #[case] backend: SolverBackend,
        #[case] tolerance: f64,
    ) {
        let solver = GoodLpSolver::new(backend, None);
        let values = solver.solve(&two_variable_program).unwrap();
        assert_relative_eq!(values[0], 0.4, epsilon = tolerance);
        assert_relative_eq!(values[1], 0.6, epsilon = tolerance);
    }

    #[rstest]
    fn should_solve_within_generous_deadline(two_variable_program: LinearProgram) {
        let solver = GoodLpSolver::new(SolverBackend::Microlp, Some(Duration::from_secs(30)));
        let values = solver.solve(&two_variable_program).unwrap();
        assert_relative_eq!(values[1], 0.6, epsilon = 1e-9);
    }

    #[rstest]
    fn should_report_infeasible_program(mut two_variable_program: LinearProgram) {
        two_variable_program.constraints.push(LinearConstraint {
            coefficients: vec![1., 0.],
            relation: Relation::AtLeast,
            rhs: 1.5,
        });
        let solver = GoodLpSolver::new(SolverBackend::Microlp, None);
        assert_eq!(
            solver.solve(&two_variable_program),
            Err(SolverError::Infeasible)
        );
    }

    #[rstest]
    fn should_reject_mismatched_dimensions(mut two_variable_program: LinearProgram) {
        two_variable_program.upper_bounds.push(1.);
        let solver = GoodLpSolver::new(SolverBackend::Microlp, None);
        assert!(matches!(
            solver.solve(&two_variable_program),
            Err(SolverError::Failed(_))
        ));
    }

    #[rstest]
    fn should_always_report_unavailable_backend(two_variable_program: LinearProgram) {
        assert!(matches!(
            UnavailableSolver.solve(&two_variable_program),
            Err(SolverError::Unavailable(_))
        ));
    }

    #[rstest]
    fn should_time_out_slow_jobs() {
        let workers = WorkerLimit::new(4);
        let result = run_with_deadline(&workers, Duration::from_millis(10), || {
            thread::sleep(Duration::from_millis(500));
            Ok(1)
        });
        assert_eq!(result, Err(SolverError::TimedOut(Duration::from_millis(10))));
    }

    #[rstest]
    fn should_refuse_new_jobs_while_abandoned_workers_run() {
        let workers = WorkerLimit::new(1);
        let timeout = Duration::from_millis(10);

        let slow = run_with_deadline(&workers, timeout, || {
            thread::sleep(Duration::from_millis(300));
            Ok(1)
        });
        assert_eq!(slow, Err(SolverError::TimedOut(timeout)));
        assert_eq!(workers.live(), 1);
        assert!(matches!(
            run_with_deadline(&workers, timeout, || Ok(2)),
            Err(SolverError::Unavailable(_))
        ));

        let deadline = Instant::now() + Duration::from_secs(10);
        while workers.live() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(workers.live(), 0);
        assert_eq!(
            run_with_deadline(&workers, Duration::from_secs(10), || Ok(3)),
            Ok(3)
        );
    }

    #[rstest]
    fn should_parse_backend_names() {
        assert_eq!("clarabel".parse::<SolverBackend>().unwrap(), SolverBackend::Clarabel);
        assert_eq!(SolverBackend::default().to_string(), "microlp");
    }
}
