// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Magnet Problem Setup
// © 1998–2026 Miroslav Šotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Immutable grid + operator pair shared by every solver run.

use crate::famus::read_famus_grid;
use crate::field::DipoleField;
use crate::grid::{DipoleGrid, ShellSurfaces};
use crate::operator::{GeometricOperator, TargetField};
use magnet_geometry::ToroidalSurface;
use magnet_types::config::GridConfig;
use magnet_types::constants::DIPOLE_DIM;
use magnet_types::error::{MagnetError, MagnetResult};
use ndarray::Array1;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct MagnetProblem {
    grid: DipoleGrid,
    operator: GeometricOperator,
}

impl MagnetProblem {
    pub fn new(grid: DipoleGrid, operator: GeometricOperator) -> MagnetResult<Self> {
        let expected = DIPOLE_DIM * grid.len();
        if operator.num_moments() != expected {
            return Err(MagnetError::shape(
                "operator columns",
                &[expected],
                &[operator.num_moments()],
            ));
        }
        Ok(Self { grid, operator })
    }

    /// Grid from the configured FAMUS file, or from a lattice between
    /// bounding surfaces derived from the configuration.
    #[instrument(skip_all)]
    pub fn setup(
        plasma: &dyn ToroidalSurface,
        cfg: &GridConfig,
        target: TargetField<'_>,
    ) -> MagnetResult<Self> {
        cfg.validate()?;
        let grid = match &cfg.famus_file {
            Some(path) => read_famus_grid(path, &cfg.lattice, cfg.b_max)?,
            None => {
                let shell = ShellSurfaces::derive(plasma, cfg)?;
                DipoleGrid::build(plasma, &shell, cfg)?
            }
        };
        Self::from_grid(plasma, grid, target)
    }

    /// Lattice grid between explicitly supplied bounding surfaces.
    pub fn setup_with_shell(
        plasma: &dyn ToroidalSurface,
        shell: &ShellSurfaces,
        cfg: &GridConfig,
        target: TargetField<'_>,
    ) -> MagnetResult<Self> {
        let grid = DipoleGrid::build(plasma, shell, cfg)?;
        Self::from_grid(plasma, grid, target)
    }

    pub fn from_grid(
        plasma: &dyn ToroidalSurface,
        grid: DipoleGrid,
        target: TargetField<'_>,
    ) -> MagnetResult<Self> {
        if grid.is_empty() {
            return Err(MagnetError::ConfigError(
                "dipole grid is empty: no candidate lies between the bounding surfaces".to_string(),
            ));
        }
        let operator = GeometricOperator::build(plasma, &grid, target)?;
        info!(
            dipoles = grid.len(),
            samples = operator.num_samples(),
            ata_scale = operator.ata_scale(),
            "magnet problem ready"
        );
        Self::new(grid, operator)
    }

    pub fn grid(&self) -> &DipoleGrid {
        &self.grid
    }

    pub fn operator(&self) -> &GeometricOperator {
        &self.operator
    }

    pub fn num_dipoles(&self) -> usize {
        self.grid.len()
    }

    /// Field evaluator for a flat solution vector.
    pub fn field(&self, m: &Array1<f64>) -> MagnetResult<DipoleField> {
        DipoleField::from_solution(&self.grid, m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnet_geometry::{QuadRange, SurfaceRZFourier};
    use magnet_types::config::LatticeConfig;
    use ndarray::{array, Array2};

    #[test]
    fn test_setup_from_offsets() {
        let plasma = SurfaceRZFourier::torus(1.0, 0.1, 1, QuadRange::FullTorus, 4, 16).unwrap();
        let cfg = GridConfig {
            plasma_offset: 0.05,
            coil_offset: 0.1,
            lattice: LatticeConfig::Cylindrical { dr: 0.05, dz: 0.05 },
            ..Default::default()
        };
        let bn = Array2::from_elem((4, 16), 0.01);
        let problem = MagnetProblem::setup(&plasma, &cfg, TargetField::Normal(&bn)).unwrap();
        assert!(problem.num_dipoles() > 0);
        assert_eq!(problem.operator().num_moments(), 3 * problem.num_dipoles());
        assert_eq!(problem.operator().num_samples(), 64);
    }

    #[test]
    fn test_empty_grid_rejected() {
        let plasma = SurfaceRZFourier::torus(1.0, 0.1, 1, QuadRange::FullTorus, 4, 8).unwrap();
        let shell = ShellSurfaces::explicit(&plasma, &plasma).unwrap();
        let bn = Array2::zeros((4, 8));
        let err = MagnetProblem::setup_with_shell(
            &plasma,
            &shell,
            &GridConfig::default(),
            TargetField::Normal(&bn),
        )
        .unwrap_err();
        assert!(matches!(err, MagnetError::ConfigError(msg) if msg.contains("empty")));
    }

    #[test]
    fn test_operator_grid_mismatch() {
        let plasma = SurfaceRZFourier::torus(1.0, 0.1, 1, QuadRange::FullTorus, 4, 8).unwrap();
        let one = DipoleGrid::from_parts(array![[1.2, 0.0, 0.0]], array![1.0], array![1.0], vec![0, 1])
            .unwrap();
        let two = DipoleGrid::from_parts(
            array![[1.2, 0.0, 0.0], [0.0, 1.2, 0.0]],
            array![1.0, 1.0],
            array![1.0, 1.0],
            vec![0, 1, 2],
        )
        .unwrap();
        let bn = Array2::zeros((4, 8));
        let op = GeometricOperator::build(&plasma, &one, TargetField::Normal(&bn)).unwrap();
        assert!(matches!(
            MagnetProblem::new(two, op),
            Err(MagnetError::ShapeMismatch { .. })
        ));
    }
}
