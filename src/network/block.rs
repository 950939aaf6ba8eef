use crate::activation::ActivationFunction;
use crate::error::Result;
use crate::layers::{BatchNorm, Conv2d, DepthwiseConv2d};
use crate::math::tensor::Tensor;
use crate::network::spec::BlockConfig;
use crate::network::weights::{load_batch_norm, load_conv, load_depthwise, ParamSource};

const SWISH: ActivationFunction = ActivationFunction::Swish;
const SIGMOID: ActivationFunction = ActivationFunction::Sigmoid;

/// Mobile inverted bottleneck block with squeeze-and-excitation.
///
/// expand (1×1) → depthwise → SE gate → project (1×1) [+ identity].
/// Dropout and drop-connect are identity at inference and are not modelled.
#[derive(Debug, Clone)]
pub struct MbConvBlock {
    pub config: BlockConfig,
    expand: Option<(Conv2d, BatchNorm)>,
    depthwise: DepthwiseConv2d,
    depthwise_bn: BatchNorm,
    se_reduce: Conv2d,
    se_expand: Conv2d,
    project: Conv2d,
    project_bn: BatchNorm,
}

/// Intermediates of one block forward pass that its input gradient needs.
#[derive(Debug, Clone)]
pub struct BlockTrace {
    in_height: usize,
    in_width: usize,
    expand_pre: Option<Tensor>,
    depthwise_pre: Tensor,
    depthwise_out: Tensor,
    se_reduce_pre: Vec<f32>,
    se_expand_pre: Vec<f32>,
    se_gate: Vec<f32>,
}

impl MbConvBlock {
    pub fn load(src: &mut dyn ParamSource, config: BlockConfig, bn_epsilon: f32) -> Result<MbConvBlock> {
        let name = config.name.clone();
        let expanded = config.expanded_filters();
        let expand = if config.expand_ratio != 1 {
            Some((
                load_conv(src, &format!("{}expand_conv", name), 1, 1, config.filters_in, expanded, false)?,
                load_batch_norm(src, &format!("{}expand_bn", name), expanded, bn_epsilon)?,
            ))
        } else {
            None
        };
        Ok(MbConvBlock {
            depthwise: load_depthwise(src, &format!("{}dwconv", name), config.kernel_size, config.stride, expanded)?,
            depthwise_bn: load_batch_norm(src, &format!("{}bn", name), expanded, bn_epsilon)?,
            se_reduce: load_conv(src, &format!("{}se_reduce", name), 1, 1, expanded, config.se_filters, true)?,
            se_expand: load_conv(src, &format!("{}se_expand", name), 1, 1, config.se_filters, expanded, true)?,
            project: load_conv(src, &format!("{}project_conv", name), 1, 1, expanded, config.filters_out, false)?,
            project_bn: load_batch_norm(src, &format!("{}project_bn", name), config.filters_out, bn_epsilon)?,
            expand,
            config,
        })
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        self.forward_traced(input).0
    }

    /// Forward pass that also returns what `backward_input` needs.
    pub fn forward_traced(&self, input: &Tensor) -> (Tensor, BlockTrace) {
        let (expanded, expand_pre) = match &self.expand {
            Some((conv, bn)) => {
                let z = bn.forward(&conv.forward(input));
                (SWISH.apply(&z), Some(z))
            }
            None => (input.clone(), None),
        };

        let depthwise_pre = self.depthwise_bn.forward(&self.depthwise.forward(&expanded));
        let depthwise_out = SWISH.apply(&depthwise_pre);

        // squeeze-and-excitation on the pooled channel descriptor
        let pooled = Tensor::from_channels(depthwise_out.global_average_pool());
        let se_reduce_pre = self.se_reduce.forward(&pooled).data;
        let reduced = Tensor::from_channels(SWISH.apply_vec(&se_reduce_pre));
        let se_expand_pre = self.se_expand.forward(&reduced).data;
        let se_gate = SIGMOID.apply_vec(&se_expand_pre);
        let excited = depthwise_out.scale_channels(&se_gate);

        let mut out = self.project_bn.forward(&self.project.forward(&excited));
        if self.config.has_residual() {
            out = out.add(input);
        }

        let trace = BlockTrace {
            in_height: input.height,
            in_width: input.width,
            expand_pre,
            depthwise_pre,
            depthwise_out,
            se_reduce_pre,
            se_expand_pre,
            se_gate,
        };
        (out, trace)
    }

    /// Gradient w.r.t. the block input given the gradient w.r.t. its output.
    pub fn backward_input(&self, trace: &BlockTrace, grad_out: &Tensor) -> Tensor {
        let (dh, dw) = (trace.depthwise_out.height, trace.depthwise_out.width);

        let grad_excited = self.project.backward_input(&self.project_bn.backward_input(grad_out), dh, dw);

        // excited = depthwise_out ⊙ gate: the gradient splits into the direct
        // path and the path through the gate.
        let mut grad_dw_out = grad_excited.scale_channels(&trace.se_gate);
        let grad_gate = grad_excited.channel_dot(&trace.depthwise_out);
        let grad_se_expand_pre = SIGMOID.backward_vec(&trace.se_expand_pre, &grad_gate);
        let grad_reduced = self.se_expand.backward_input(&Tensor::from_channels(grad_se_expand_pre), 1, 1).data;
        let grad_se_reduce_pre = SWISH.backward_vec(&trace.se_reduce_pre, &grad_reduced);
        let grad_pooled = self.se_reduce.backward_input(&Tensor::from_channels(grad_se_reduce_pre), 1, 1).data;
        grad_dw_out = grad_dw_out.add(&Tensor::broadcast_pool_grad(&grad_pooled, dh, dw));

        let grad_dw_pre = SWISH.backward(&trace.depthwise_pre, &grad_dw_out);
        let grad_expanded = self.depthwise.backward_input(
            &self.depthwise_bn.backward_input(&grad_dw_pre),
            trace.in_height,
            trace.in_width,
        );

        let mut grad_in = match (&self.expand, &trace.expand_pre) {
            (Some((conv, bn)), Some(z)) => conv.backward_input(
                &bn.backward_input(&SWISH.backward(z, &grad_expanded)),
                trace.in_height,
                trace.in_width,
            ),
            _ => grad_expanded,
        };
        if self.config.has_residual() {
            grad_in = grad_in.add(grad_out);
        }
        grad_in
    }
}
